use crate::tests::{run_ok, value};
use crate::theory::qualify;

#[test]
fn test_instance_arguments_searched() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(value(&sigma, "innermost").as_nat(), Some(3));
    assert_eq!(
        sigma.instances_of(&qualify("index", "Pointed")),
        &[qualify("index", "natPointed"), qualify("index", "listPointed")]
    );
}
