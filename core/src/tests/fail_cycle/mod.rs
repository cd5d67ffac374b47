use crate::tests::run_err;
use crate::Error;

#[test]
fn test_cycle_path() {
    match run_err(module_path!()) {
        Error::DependencyCycle(path) => assert_eq!(path, ["a", "sub.b", "c", "a"]),
        e => panic!("unexpected {e}"),
    }
}
