use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use strum::Display;

use crate::cache::{CacheEntry, CacheStore, ContentHash};
use crate::config::Config;
use crate::theory::abs::builtin::{self, PRELUDE};
use crate::theory::abs::def::{Def, Sigma};
use crate::theory::conc::data::Module;
use crate::theory::conc::elab::Elaborator;
use crate::theory::conc::load::{self, Source};
use crate::theory::conc::resolve::{Resolver, Scope};
use crate::theory::surf::Parser;
use crate::theory::{Loc, Name};
use crate::{prelude, print_warn, show_err, Error, Warning};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum ModuleStatus {
    /// Elaborated in this session.
    Checked,
    /// Loaded from a valid cache entry.
    Cached,
    Failed,
    /// Not attempted because a dependency failed.
    Unreachable,
}

/// The outcome of one module.
#[derive(Debug)]
pub struct ModuleReport {
    pub source: Source,
    pub status: ModuleStatus,
    pub hash: Option<ContentHash>,
    /// Exported definitions in declaration order.
    pub defs: Vec<Name>,
    pub warnings: Vec<Warning>,
    pub errors: Vec<Error>,
}

impl ModuleReport {
    fn new(source: Source, status: ModuleStatus) -> Self {
        Self {
            source,
            status,
            hash: None,
            defs: Default::default(),
            warnings: Default::default(),
            errors: Default::default(),
        }
    }

    fn failed(source: Source, errors: Vec<Error>) -> Self {
        Self {
            errors,
            ..Self::new(source, ModuleStatus::Failed)
        }
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ModuleStatus::Checked | ModuleStatus::Cached)
    }

    /// Renders every warning and error against the module source.
    pub fn print(&self) {
        let (path, src) = (&self.source.path, &self.source.text);
        for w in &self.warnings {
            print_warn(w, path, src)
        }
        for e in &self.errors {
            show_err(e, path, src)
        }
    }
}

struct Unit {
    source: Source,
    module: Option<Module>,
    deps: Vec<usize>,
}

/// A checking session. The prelude is loaded first; other modules are
/// checked in dependency order, independent ones in parallel.
pub struct Driver {
    config: Config,
    sigma: Arc<RwLock<Sigma>>,
    store: Option<CacheStore>,
    /// Modules usable as dependencies, with their hashes and exports.
    modules: HashMap<String, (ContentHash, Vec<Name>)>,
    prelude_warnings: Vec<Warning>,
}

impl Driver {
    pub fn new(config: Config) -> Self {
        let store = config.cache_dir.as_ref().map(CacheStore::new);
        Self {
            config,
            sigma: Default::default(),
            store,
            modules: Default::default(),
            prelude_warnings: Default::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared definition registry.
    pub fn sigma(&self) -> Arc<RwLock<Sigma>> {
        self.sigma.clone()
    }

    pub fn hash_of(&self, module: &str) -> Option<ContentHash> {
        self.modules.get(module).map(|(h, _)| *h)
    }

    /// Warnings from checking the prelude on behalf of other modules.
    pub fn prelude_warnings(&self) -> &[Warning] {
        &self.prelude_warnings
    }

    /// The prelude's hash covers its source and the primitives it is
    /// checked against.
    pub fn prelude_hash(source: &Source, prims: &[Def]) -> Result<ContentHash, Error> {
        Ok(ContentHash::with_deps(
            source.text.as_bytes(),
            [ContentHash::of_defs(prims)?],
        ))
    }

    /// Loads the prelude: its primitives and derived definitions, from the
    /// cache when allowed and valid.
    pub fn prelude(&mut self) -> ModuleReport {
        let source = prelude::source();
        let prims = builtin::setup();
        let hash = match Self::prelude_hash(&source, &prims) {
            Ok(h) => h,
            Err(e) => return ModuleReport::failed(source, vec![e]),
        };
        if self.config.use_prelude_cache {
            if let Some(entry) = self.cached(PRELUDE, &hash, &[]) {
                info!(target: "driver", "{PRELUDE}: cached");
                return self.adopt(source, hash, entry.defs, ModuleStatus::Cached);
            }
        }

        let visible = prims.iter().map(|d| d.name).collect::<Vec<_>>();
        {
            let mut sigma = self.sigma.write();
            for d in &prims {
                sigma.insert(d.clone())
            }
        }
        let module = match Parser::new(PRELUDE).parse(&source.text) {
            Ok(m) => m,
            Err(e) => return ModuleReport::failed(source, vec![e]),
        };
        let (defs, warnings, errors) = {
            let base = self.sigma.read();
            self.elaborate(&base, &source, &module, &visible)
        };
        if !errors.is_empty() {
            warn!(target: "driver", "{PRELUDE}: {} errors", errors.len());
            return ModuleReport {
                warnings,
                ..ModuleReport::failed(source, errors)
            };
        }
        let all = prims.into_iter().chain(defs).collect::<Vec<_>>();
        self.persist(CacheEntry {
            module: PRELUDE.to_string(),
            hash,
            deps: Default::default(),
            defs: all.clone(),
        });
        info!(target: "driver", "{PRELUDE}: checked");
        ModuleReport {
            warnings,
            ..self.adopt(source, hash, all, ModuleStatus::Checked)
        }
    }

    fn ensure_prelude(&mut self) -> Result<(), Error> {
        if self.modules.contains_key(PRELUDE) {
            return Ok(());
        }
        let r = self.prelude();
        for w in &r.warnings {
            warn!(target: "driver", "{PRELUDE}: {w}");
        }
        self.prelude_warnings = r.warnings;
        match r.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registers the definitions of a finished module.
    fn adopt(
        &mut self,
        source: Source,
        hash: ContentHash,
        defs: Vec<Def>,
        status: ModuleStatus,
    ) -> ModuleReport {
        let names = defs.iter().map(|d| d.name).collect::<Vec<_>>();
        let mut sigma = self.sigma.write();
        for d in defs {
            sigma.insert(d)
        }
        self.modules.insert(source.name.clone(), (hash, names.clone()));
        ModuleReport {
            hash: Some(hash),
            defs: names,
            ..ModuleReport::new(source, status)
        }
    }

    /// Drops every module but the prelude, so the session can check a new
    /// set of sources.
    fn forget(&mut self) {
        let mut sigma = self.sigma.write();
        self.modules.retain(|name, (_, defs)| {
            if name == PRELUDE {
                return true;
            }
            for d in defs.iter() {
                sigma.remove(d);
            }
            false
        });
    }

    fn cached(&self, module: &str, hash: &ContentHash, deps: &[(String, ContentHash)]) -> Option<CacheEntry> {
        let entry = self.store.as_ref()?.load(module)?;
        if entry.is_valid(hash, deps) {
            Some(entry)
        } else {
            debug!(target: "driver", "{module}: stale cache entry");
            None
        }
    }

    /// A failed write only costs the next session a re-check.
    fn persist(&self, entry: CacheEntry) {
        if let Some(store) = &self.store {
            if let Err(e) = store.store(&entry) {
                warn!(target: "driver", "cannot cache {}: {e}", entry.module);
            }
        }
    }

    /// Checks every source file under `root`.
    pub fn check_dir(&mut self, root: &Path) -> Result<Vec<ModuleReport>, Error> {
        let sources = load::discover(root)?;
        self.check_sources(sources)
    }

    /// Checks a set of modules importing each other. Reports come back in
    /// the order of `sources`. A dependency cycle fails the whole set.
    pub fn check_sources(&mut self, sources: Vec<Source>) -> Result<Vec<ModuleReport>, Error> {
        self.ensure_prelude()?;
        self.forget();

        let mut reports = sources.iter().map(|_| None).collect::<Vec<Option<ModuleReport>>>();
        let mut units = Vec::with_capacity(sources.len());
        let mut errors = Vec::with_capacity(sources.len());
        for s in sources {
            let module = if s.name == PRELUDE {
                Err(vec![Error::DuplicateName(s.name.clone(), Loc::default())])
            } else {
                Parser::new(&s.name).parse(&s.text).map_err(|e| vec![e])
            };
            match module {
                Ok(m) => {
                    units.push(Unit {
                        source: s,
                        module: Some(m),
                        deps: Default::default(),
                    });
                    errors.push(Vec::default())
                }
                Err(es) => {
                    units.push(Unit {
                        source: s,
                        module: None,
                        deps: Default::default(),
                    });
                    errors.push(es)
                }
            }
        }

        let edges = {
            let graph = units
                .iter()
                .map(|u| {
                    let imports = u.module.as_ref().map_or(&[][..], |m| m.imports.as_slice());
                    (u.source.name.as_str(), imports)
                })
                .collect::<Vec<_>>();
            load::imports(&graph)
        };
        for (i, e) in edges.into_iter().enumerate() {
            match e {
                Ok(deps) => units[i].deps = deps,
                Err(es) => errors[i].extend(es),
            }
        }
        for (i, es) in errors.into_iter().enumerate() {
            if !es.is_empty() {
                info!(target: "driver", "{}: failed before elaboration", units[i].source.name);
                reports[i] = Some(ModuleReport::failed(units[i].source.clone(), es));
            }
        }

        let names = units.iter().map(|u| u.source.name.as_str()).collect::<Vec<_>>();
        let deps = units.iter().map(|u| u.deps.clone()).collect::<Vec<_>>();
        let waves = load::waves(&deps, &names)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .stack_size(self.config.worker_stack)
            .build()
            .map_err(io::Error::other)?;
        for wave in waves {
            let todo = wave
                .into_iter()
                .filter(|i| reports[*i].is_none())
                .collect::<Vec<_>>();
            let this = &*self;
            let units = &units;
            let outs = pool.install(|| {
                todo.par_iter()
                    .map(|i| (*i, this.module(units, *i)))
                    .collect::<Vec<_>>()
            });
            for (i, r) in outs {
                if r.is_ok() {
                    if let Some(hash) = r.hash {
                        self.modules
                            .insert(r.source.name.clone(), (hash, r.defs.clone()));
                    }
                }
                reports[i] = Some(r);
            }
        }

        Ok(reports.into_iter().flatten().collect())
    }

    /// Checks one module whose dependencies are all finished.
    fn module(&self, units: &[Unit], i: usize) -> ModuleReport {
        let unit = &units[i];
        let source = unit.source.clone();
        let Some(module) = &unit.module else {
            return ModuleReport::failed(source, Default::default());
        };

        let mut deps = vec![(PRELUDE.to_string(), Default::default())];
        let mut visible = Vec::default();
        for d in unit.deps.iter().map(|d| &units[*d].source.name) {
            deps.push((d.clone(), Default::default()))
        }
        for (name, hash) in deps.iter_mut() {
            match self.modules.get(name.as_str()) {
                Some((h, defs)) => {
                    *hash = *h;
                    visible.extend(defs.iter().copied())
                }
                None => {
                    let loc = module
                        .imports
                        .iter()
                        .find(|i| i.module.as_str() == name.as_str())
                        .map_or_else(Loc::default, |i| i.loc);
                    info!(target: "driver", "{}: unreachable", source.name);
                    return ModuleReport {
                        errors: vec![Error::DependencyFailed {
                            name: source.name.clone(),
                            failed: name.clone(),
                            loc,
                        }],
                        ..ModuleReport::new(source, ModuleStatus::Unreachable)
                    };
                }
            }
        }
        deps.sort();
        let hash = ContentHash::with_deps(source.text.as_bytes(), deps.iter().map(|(_, h)| *h));

        if let Some(entry) = self.cached(&source.name, &hash, &deps) {
            info!(target: "driver", "{}: cached", source.name);
            let names = entry.defs.iter().map(|d| d.name).collect();
            let mut sigma = self.sigma.write();
            for d in entry.defs {
                sigma.insert(d)
            }
            return ModuleReport {
                hash: Some(hash),
                defs: names,
                ..ModuleReport::new(source, ModuleStatus::Cached)
            };
        }

        info!(target: "driver", "{}: elaborating", source.name);
        let (defs, warnings, errors) = {
            let base = self.sigma.read();
            self.elaborate(&base, &source, module, &visible)
        };
        if !errors.is_empty() {
            info!(target: "driver", "{}: {} errors", source.name, errors.len());
            return ModuleReport {
                warnings,
                ..ModuleReport::failed(source, errors)
            };
        }

        let names = defs.iter().map(|d| d.name).collect();
        self.persist(CacheEntry {
            module: source.name.clone(),
            hash,
            deps,
            defs: defs.clone(),
        });
        let mut sigma = self.sigma.write();
        for d in defs {
            sigma.insert(d)
        }
        info!(target: "driver", "{}: checked", source.name);
        ModuleReport {
            hash: Some(hash),
            defs: names,
            warnings,
            ..ModuleReport::new(source, ModuleStatus::Checked)
        }
    }

    /// Resolves and elaborates every declaration of a module, collecting
    /// the errors of all failing ones.
    fn elaborate(
        &self,
        base: &Sigma,
        source: &Source,
        module: &Module,
        visible: &[Name],
    ) -> (Vec<Def>, Vec<Warning>, Vec<Error>) {
        let mut scope = Scope::default();
        scope.import(visible.iter().filter_map(|n| base.get(n)));
        let names = module.decls.iter().map(|d| d.names()).collect::<Vec<_>>();
        let resolved = Resolver::new(module.name, scope).decls(module.decls.clone());

        let mut elab = Elaborator::new(base, &self.config);
        let mut defs = Vec::default();
        let mut errors = Vec::default();
        for (d, names) in resolved.into_iter().zip(names) {
            match d.and_then(|d| elab.decl(&d, &source.text)) {
                Ok(ds) => defs.extend(ds),
                Err(e) => {
                    elab.poison(names);
                    errors.push(e)
                }
            }
        }
        (defs, elab.take_warnings(), errors)
    }
}
