use crate::tests::run_err;
use crate::Error;

#[test]
fn test_universe_too_small() {
    match run_err(module_path!()) {
        Error::LevelInconsistency(..) => {}
        e => panic!("unexpected {e}"),
    }
}
