use crate::tests::{run_ok, value};
use crate::theory::abs::def::Body;
use crate::theory::qualify;

#[test]
fn test_path_rules() {
    let (driver, reports) = run_ok(module_path!());
    assert!(reports[0].warnings.is_empty());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(value(&sigma, "middle").as_nat(), Some(2));
    for f in ["leftEnd", "rightEnd", "etaPath"] {
        assert!(matches!(
            sigma.get(&qualify("index", f)).unwrap().body,
            Body::Fn { .. }
        ));
    }
}
