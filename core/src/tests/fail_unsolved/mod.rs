use crate::tests::run_err;
use crate::Error;

#[test]
fn test_unsolved_element_type() {
    match run_err(module_path!()) {
        Error::UnsolvedMetavariable(..) => {}
        e => panic!("unexpected {e}"),
    }
}
