use std::collections::HashMap;

use log::trace;

use crate::theory::abs::data::{Level, LevelVar, MetaId};
use crate::theory::Loc;
use crate::Error;
use crate::Error::LevelInconsistency;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Node {
    Zero,
    Param,
    Meta(MetaId),
}

impl From<LevelVar> for Node {
    fn from(v: LevelVar) -> Self {
        match v {
            LevelVar::Param => Node::Param,
            LevelVar::Meta(m) => Node::Meta(m),
        }
    }
}

/// `from + weight <= to`.
#[derive(Debug, Clone)]
struct Edge {
    from: Node,
    to: Node,
    weight: i64,
    loc: Loc,
}

/// A solved level of the form `max(\l + add, max)`, the `\l` part absent
/// when `add` is `None`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Value {
    add: Option<i64>,
    max: i64,
}

impl Value {
    fn at_zero(&self) -> i64 {
        self.add.map_or(self.max, |a| a.max(self.max))
    }
}

/// `from + add <= max(to + to_add, max)`, which a single edge would
/// over-constrain when the constant side already suffices.
#[derive(Debug, Clone)]
struct Alt {
    from: Node,
    add: i64,
    to: Node,
    to_add: i64,
    max: i64,
    loc: Loc,
}

impl Alt {
    fn holds(&self, values: &Values) -> bool {
        let (u, v) = (values.get(&self.from), values.get(&self.to));
        let lifted = match u.add {
            Some(p) => v.add.is_some_and(|q| p + self.add <= q + self.to_add),
            None => true,
        };
        lifted && u.max + self.add <= (v.at_zero() + self.to_add).max(self.max)
    }
}

/// Longest distances from zero and from `\lp` to every node.
struct Values {
    from_zero: HashMap<Node, i64>,
    from_param: HashMap<Node, i64>,
}

impl Values {
    fn get(&self, n: &Node) -> Value {
        match n {
            Node::Zero => Value { add: None, max: 0 },
            Node::Param => Value {
                add: Some(0),
                max: 0,
            },
            n => Value {
                add: self.from_param.get(n).map(|a| (*a).max(0)),
                max: self.from_zero.get(n).copied().unwrap_or(0).max(0),
            },
        }
    }
}

/// Constraints between the levels of one definition. Solved by computing the
/// least assignment to every level metavariable.
#[derive(Debug, Clone, Default)]
pub struct LevelGraph {
    edges: Vec<Edge>,
    alts: Vec<Alt>,
    uppers: Vec<(Node, i64, Loc)>,
    infs: Vec<(MetaId, Loc)>,
}

impl LevelGraph {
    fn fail(msg: String, loc: Loc) -> Result<(), Error> {
        Err(LevelInconsistency(msg, loc))
    }

    fn edge(&mut self, from: Node, to: Node, weight: i64, loc: Loc) {
        if from == to && weight <= 0 {
            return;
        }
        trace!(target: "level", "{from:?} + {weight} <= {to:?}");
        self.edges.push(Edge {
            from,
            to,
            weight,
            loc,
        })
    }

    pub fn add_eq(&mut self, l: &Level, r: &Level, loc: Loc) -> Result<(), Error> {
        self.add_le(l, r, loc)?;
        self.add_le(r, l, loc)
    }

    pub fn add_le(&mut self, l: &Level, r: &Level, loc: Loc) -> Result<(), Error> {
        use Level::*;
        match (*l, *r) {
            (_, Inf) => Ok(()),
            (Inf, Var {
                var: LevelVar::Meta(m),
                ..
            }) => {
                self.infs.push((m, loc));
                Ok(())
            }
            (Inf, r) => Self::fail(format!("\\oo <= {r}"), loc),
            (Const(a), Const(b)) => {
                if a <= b {
                    Ok(())
                } else {
                    Self::fail(format!("{a} <= {b}"), loc)
                }
            }
            (Const(a), Var { var, add, max }) => {
                if a > max {
                    self.edge(Node::Zero, var.into(), a as i64 - add as i64, loc)
                }
                Ok(())
            }
            (Var { var, add, max }, r) => {
                if max > 0 {
                    self.add_le(&Const(max), &r, loc)?;
                }
                match r {
                    Const(b) => {
                        if add > b {
                            return Self::fail(format!("{l} <= {b}"), loc);
                        }
                        if var == LevelVar::Param {
                            return Self::fail(format!("{l} <= {b}"), loc);
                        }
                        self.uppers.push((var.into(), b as i64 - add as i64, loc));
                        Ok(())
                    }
                    Var {
                        var: w,
                        add: a,
                        max: 0,
                    } => {
                        self.edge(var.into(), w.into(), add as i64 - a as i64, loc);
                        Ok(())
                    }
                    Var {
                        var: w,
                        add: a,
                        max: m,
                    } => {
                        if var == w && add <= a {
                            return Ok(());
                        }
                        trace!(target: "level", "{var:?} + {add} <= max({w:?} + {a}, {m})");
                        self.alts.push(Alt {
                            from: var.into(),
                            add: add as i64,
                            to: w.into(),
                            to_add: a as i64,
                            max: m as i64,
                            loc,
                        });
                        Ok(())
                    }
                    Inf => Ok(()),
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
            && self.alts.is_empty()
            && self.uppers.is_empty()
            && self.infs.is_empty()
    }

    /// Least solution for `metas`. Metavariables without a lower bound are
    /// free and come out as `0`. An alternative bound the least solution
    /// breaks is narrowed to its edge and the graph solved again.
    pub fn solve(&self, metas: &[MetaId]) -> Result<HashMap<MetaId, Level>, Error> {
        let mut g = self.clone();
        let mut nodes = vec![Node::Zero, Node::Param];
        nodes.extend(metas.iter().map(|m| Node::Meta(*m)));
        for (from, to) in g
            .edges
            .iter()
            .map(|e| (e.from, e.to))
            .chain(g.alts.iter().map(|a| (a.from, a.to)))
        {
            for n in [from, to] {
                if !nodes.contains(&n) {
                    nodes.push(n)
                }
            }
        }

        let values = loop {
            let values = g.least(&nodes)?;
            match g.alts.iter().position(|a| !a.holds(&values)) {
                None => break values,
                Some(i) => {
                    let a = g.alts.swap_remove(i);
                    g.edge(a.from, a.to, a.add - a.to_add, a.loc);
                }
            }
        };

        let mut infinite = Vec::default();
        let mut stack = g.infs.clone();
        while let Some((m, loc)) = stack.pop() {
            if infinite.contains(&m) {
                continue;
            }
            if g.uppers.iter().any(|(n, _, _)| *n == Node::Meta(m)) {
                return Err(LevelInconsistency(format!("\\oo <= ?l{m}"), loc));
            }
            infinite.push(m);
            let succs = g
                .edges
                .iter()
                .map(|e| (e.from, e.to, e.loc))
                .chain(g.alts.iter().map(|a| (a.from, a.to, a.loc)));
            for (from, to, loc) in succs {
                if from != Node::Meta(m) {
                    continue;
                }
                match to {
                    Node::Meta(n) => stack.push((n, loc)),
                    n => return Err(LevelInconsistency(format!("\\oo <= {n:?}"), loc)),
                }
            }
        }

        let mut ret = HashMap::default();
        for n in &nodes {
            if let Node::Meta(m) = n {
                let l = if infinite.contains(m) {
                    Level::Inf
                } else {
                    let v = values.get(n);
                    let fit = |x: i64| {
                        u32::try_from(x).map_err(|_| {
                            LevelInconsistency(format!("?l{m} overflows at {x}"), Loc::default())
                        })
                    };
                    match v.add {
                        Some(a) => Level::var(LevelVar::Param, fit(a)?, fit(v.max)?),
                        None => Level::Const(fit(v.max)?),
                    }
                };
                ret.insert(*m, l);
            }
        }
        Ok(ret)
    }

    /// Longest-path relaxation over the hard edges, then checks every edge
    /// and upper bound against the result.
    fn least(&self, nodes: &[Node]) -> Result<Values, Error> {
        let mut from_zero = HashMap::<Node, i64>::default();
        let mut from_param = HashMap::<Node, i64>::default();
        for n in nodes {
            from_zero.insert(*n, 0);
        }
        from_param.insert(Node::Param, 0);

        let rounds = nodes.len() + 1;
        for round in 0.. {
            let mut changed = None;
            for e in &self.edges {
                if let Some(d) = from_zero.get(&e.from).copied() {
                    let cur = from_zero.get(&e.to).copied().unwrap_or(0);
                    if d + e.weight > cur {
                        from_zero.insert(e.to, d + e.weight);
                        changed = Some(e);
                    }
                }
                if let Some(d) = from_param.get(&e.from).copied() {
                    let cur = from_param.get(&e.to).copied();
                    if cur.map_or(true, |c| d + e.weight > c) {
                        from_param.insert(e.to, d + e.weight);
                        changed = Some(e);
                    }
                }
            }
            match changed {
                None => break,
                Some(e) if round >= rounds => {
                    return Err(LevelInconsistency(
                        format!("cyclic constraint through {:?}", e.to),
                        e.loc,
                    ));
                }
                Some(_) => {}
            }
        }
        let values = Values {
            from_zero,
            from_param,
        };

        for e in &self.edges {
            let (u, v) = (values.get(&e.from), values.get(&e.to));
            let holds = match u.add {
                Some(a) => v.add.is_some_and(|b| a + e.weight <= b),
                None => true,
            } && u.max + e.weight <= v.at_zero().max(v.max);
            if !holds {
                return Err(LevelInconsistency(
                    format!("{:?} + {} <= {:?}", e.from, e.weight, e.to),
                    e.loc,
                ));
            }
        }
        for (n, b, loc) in &self.uppers {
            let v = values.get(n);
            if v.add.is_some() || v.max > *b {
                return Err(LevelInconsistency(format!("{n:?} <= {b}"), *loc));
            }
        }
        Ok(values)
    }
}
