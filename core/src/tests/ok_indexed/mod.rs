use crate::tests::{check_src, run_ok, value};
use crate::theory::abs::data::Term;
use crate::theory::abs::def::Body;
use crate::theory::qualify;
use crate::Error;

const VEC: &str = "\\data Vec (A : \\Type) (n : Nat) \\with
  | A, zero => vnil
  | A, suc m => vcons A (Vec A m)
";

#[test]
fn test_indexed_families() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();

    assert_eq!(value(&sigma, "first").as_nat(), Some(7));
    assert_eq!(value(&sigma, "size").as_nat(), Some(2));

    let vcons = sigma.get(&qualify("index", "vcons")).unwrap();
    match &vcons.body {
        Body::Ctor {
            params,
            pats: Some(pats),
            ..
        } => {
            assert_eq!(*params, 2);
            assert_eq!(pats.len(), 2);
            assert_eq!(pats[0], Term::Var(1));
            assert_eq!(pats[1], Term::Suc(Box::new(Term::Var(0))));
        }
        b => panic!("unexpected {b:?}"),
    }
    assert_eq!(vcons.tele.len(), 4);

    match value(&sigma, "last") {
        Term::Con(c, _, params, args) => {
            assert_eq!(c, qualify("index", "fsuc"));
            assert_eq!(params.len(), 1);
            assert_eq!(params[0].as_nat(), Some(1));
            assert_eq!(args.len(), 1);
        }
        tm => panic!("unexpected {tm}"),
    }
}

#[test]
fn test_stuck_index() {
    let src = format!(
        "{VEC}\\func count {{A : \\Type}} {{n : Nat}} (v : Vec A n) : Nat \\with
  | vnil => 0
  | vcons _ _ => 1
"
    );
    match check_src(&src) {
        Err(Error::TypeMismatch { expected, .. }) => {
            assert!(expected.contains("index of Vec"), "{expected}")
        }
        r => panic!("unexpected {:?}", r.err()),
    }
}

#[test]
fn test_impossible_constructor() {
    let src = format!(
        "{VEC}\\func bad {{A : \\Type}} (v : Vec A 0) : A \\with
  | vcons x _ => x
"
    );
    assert!(matches!(
        check_src(&src),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_index_pattern_count() {
    let src = "\\data Bad (n : Nat) \\with\n  | zero, zero => bad\n";
    match check_src(src) {
        Err(Error::TypeMismatch { expected, .. }) => assert_eq!(expected, "1 patterns"),
        r => panic!("unexpected {:?}", r.err()),
    }
}
