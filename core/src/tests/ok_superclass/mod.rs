use crate::tests::{run_ok, value};
use crate::theory::qualify;

#[test]
fn test_superclass_projection() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(value(&sigma, "one").as_nat(), Some(1));
    assert_eq!(value(&sigma, "two").as_nat(), Some(2));
    assert_eq!(value(&sigma, "viaLocal").as_nat(), Some(1));
    assert!(sigma.instances_of(&qualify("index", "Pointed")).is_empty());
}
