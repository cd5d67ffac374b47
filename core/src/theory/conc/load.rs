use std::collections::HashMap;
use std::fs::{read_dir, read_to_string};
use std::path::{Path, PathBuf};

use log::trace;

use crate::theory::abs::builtin::PRELUDE;
use crate::theory::conc::data::Import;
use crate::Error;
use crate::Error::{DependencyCycle, UnknownModule};

pub const FILE_EXT: &str = "vc";

/// A module's source text.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub path: PathBuf,
    pub text: String,
}

impl Source {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from(format!("{}.{FILE_EXT}", name.replace('.', "/"))),
            text: text.to_string(),
        }
    }
}

/// The module name of a source file under `root`: its path components
/// without the extension, joined by dots.
pub fn module_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?.with_extension("");
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

/// Every source file under `root`, sorted by module name.
pub fn discover(root: &Path) -> Result<Vec<Source>, Error> {
    let mut files = Vec::default();
    walk(root, &mut files)?;
    let mut ret = Vec::with_capacity(files.len());
    for path in files {
        let Some(name) = module_name(root, &path) else {
            continue;
        };
        let text = read_to_string(&path)?;
        ret.push(Source { name, path, text });
    }
    ret.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ret)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    for entry in read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.extension().is_some_and(|e| e == FILE_EXT) {
            out.push(path)
        }
    }
    Ok(())
}

/// Import edges of modules given by name and imports, as indices into
/// `modules`. The prelude is imported implicitly and never appears as an
/// edge.
pub fn imports(modules: &[(&str, &[Import])]) -> Vec<Result<Vec<usize>, Vec<Error>>> {
    let index = modules
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (*name, i))
        .collect::<HashMap<_, _>>();
    modules
        .iter()
        .map(|(_, imports)| {
            let mut deps = Vec::default();
            let mut errs = Vec::default();
            for i in imports.iter() {
                if i.module.as_str() == PRELUDE {
                    continue;
                }
                match index.get(i.module.as_str()) {
                    Some(d) if !deps.contains(d) => deps.push(*d),
                    Some(_) => {}
                    None => errs.push(UnknownModule(i.module.to_string(), i.loc)),
                }
            }
            if errs.is_empty() {
                Ok(deps)
            } else {
                Err(errs)
            }
        })
        .collect()
}

/// Groups modules into waves: every module comes after all of its
/// dependencies, and modules of one wave are independent of each other.
pub fn waves(deps: &[Vec<usize>], names: &[&str]) -> Result<Vec<Vec<usize>>, Error> {
    let n = deps.len();
    let mut pending = deps.iter().map(|d| d.len()).collect::<Vec<_>>();
    let mut users = vec![Vec::default(); n];
    for (i, ds) in deps.iter().enumerate() {
        for d in ds {
            users[*d].push(i)
        }
    }

    let mut ret = Vec::default();
    let mut wave = (0..n).filter(|i| pending[*i] == 0).collect::<Vec<_>>();
    let mut done = 0;
    while !wave.is_empty() {
        done += wave.len();
        let mut next = Vec::default();
        for i in &wave {
            for u in &users[*i] {
                pending[*u] -= 1;
                if pending[*u] == 0 {
                    next.push(*u)
                }
            }
        }
        next.sort();
        trace!(target: "load", "wave {:?}", wave.iter().map(|i| names[*i]).collect::<Vec<_>>());
        ret.push(wave);
        wave = next;
    }
    if done < n {
        return Err(DependencyCycle(cycle(deps, &pending, names)));
    }
    Ok(ret)
}

/// Walks unfinished dependencies from an unfinished module until one repeats.
fn cycle(deps: &[Vec<usize>], pending: &[usize], names: &[&str]) -> Vec<String> {
    let Some(start) = (0..deps.len()).find(|i| pending[*i] > 0) else {
        return Vec::default();
    };
    let mut path = vec![start];
    let mut cur = start;
    loop {
        let Some(next) = deps[cur].iter().copied().find(|d| pending[*d] > 0) else {
            break;
        };
        if let Some(pos) = path.iter().position(|p| *p == next) {
            let mut ret = path[pos..]
                .iter()
                .map(|i| names[*i].to_string())
                .collect::<Vec<_>>();
            ret.push(names[next].to_string());
            return ret;
        }
        path.push(next);
        cur = next;
    }
    path.iter().map(|i| names[*i].to_string()).collect()
}
