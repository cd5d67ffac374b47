use pest::Parser as _;
use pest_derive::Parser as PestParser;
use ustr::Ustr;

use crate::theory::conc::data::Module;
use crate::theory::surf::trans::Trans;
use crate::Error;

mod trans;

#[derive(PestParser)]
#[grammar = "theory/surf/grammar.pest"]
struct SurfParser;

pub struct Parser {
    module: Ustr,
    trans: Trans,
}

impl Parser {
    pub fn new(module: &str) -> Self {
        let module = Ustr::from(module);
        Self {
            module,
            trans: Trans::new(module),
        }
    }

    pub fn parse(&mut self, src: &str) -> Result<Module, Error> {
        let pairs = SurfParser::parse(Rule::file, src).map_err(Box::new)?;
        let (imports, decls) = self.trans.file(pairs);
        if let Some(e) = self.trans.take_error() {
            return Err(e);
        }
        Ok(Module {
            name: self.module,
            imports,
            decls,
        })
    }
}
