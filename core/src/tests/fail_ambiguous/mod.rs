use crate::tests::run_err;
use crate::Error;

#[test]
fn test_ambiguous_instance() {
    match run_err(module_path!()) {
        Error::AmbiguousInstance {
            class, candidates, ..
        } => {
            assert_eq!(class, "Default");
            assert_eq!(candidates, ["zeroDefault", "oneDefault"]);
        }
        e => panic!("unexpected {e}"),
    }
}
