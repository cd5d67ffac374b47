use crate::tests::{run_ok, value};
use crate::theory::qualify;

#[test]
fn test_instances() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(value(&sigma, "seven").as_nat(), Some(7));
    assert_eq!(value(&sigma, "viaLocal").as_nat(), Some(7));
    assert_eq!(
        sigma.instances_of(&qualify("index", "Pointed")),
        &[qualify("index", "natPointed")]
    );
}

#[test]
fn test_default_field() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(value(&sigma, "four").as_nat(), Some(4));
}
