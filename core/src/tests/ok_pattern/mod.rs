use crate::tests::{run_ok, value};
use crate::theory::abs::data::Term;
use crate::theory::abs::def::Body;
use crate::theory::qualify;
use crate::Warning;

#[test]
fn test_patterns() {
    let (driver, reports) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();

    match value(&sigma, "notTrue") {
        Term::Con(c, _, _, args) => {
            assert_eq!(c, qualify("index", "false"));
            assert!(args.is_empty());
        }
        tm => panic!("unexpected {tm}"),
    }
    assert_eq!(value(&sigma, "three").as_nat(), Some(3));

    match &sigma.get(&qualify("index", "length")).unwrap().body {
        Body::Fn { decreasing, .. } => assert_eq!(*decreasing, Some(1)),
        _ => panic!(),
    }

    let warnings = &reports[0].warnings;
    assert_eq!(warnings.len(), 1);
    assert!(matches!(warnings[0], Warning::RedundantClause(_)));
}
