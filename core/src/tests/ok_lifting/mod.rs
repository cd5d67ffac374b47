use crate::tests::{body, run_ok, value};
use crate::theory::abs::data::{Level, Sort, Term};
use crate::theory::qualify;

fn instance_of_id(tm: &Term) -> Sort {
    match tm.spine().0 {
        Term::Ref(n, s) if *n == qualify("index", "Id") => *s,
        t => panic!("unexpected head {t}"),
    }
}

#[test]
fn test_lifted_at_two_levels() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(
        instance_of_id(body(&sigma, "low")),
        Sort::new(Level::Const(0), Level::Const(0))
    );
    assert_eq!(
        instance_of_id(body(&sigma, "high")),
        Sort::new(Level::Const(4), Level::Const(1))
    );
    assert_eq!(value(&sigma, "low"), Term::Nat);
    assert_eq!(
        value(&sigma, "high"),
        Term::univ(Level::Const(3), Level::Const(0))
    );
}
