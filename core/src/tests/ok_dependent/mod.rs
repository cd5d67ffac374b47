use crate::tests::run_ok;
use crate::theory::abs::def::Body;
use crate::theory::qualify;

#[test]
fn test_dependent_match() {
    let (driver, reports) = run_ok(module_path!());
    assert_eq!(reports.len(), 1);
    let sigma = driver.sigma();
    let sigma = sigma.read();
    match &sigma.get(&qualify("index", "plusZero")).unwrap().body {
        Body::Fn { decreasing, .. } => assert_eq!(*decreasing, Some(0)),
        _ => panic!(),
    }
}
