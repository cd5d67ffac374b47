use crate::tests::run_err;
use crate::Error;

#[test]
fn test_instance_depth_exhausted() {
    match run_err(module_path!()) {
        Error::NoInstanceFound { class, .. } => assert_eq!(class, "Pointed"),
        e => panic!("unexpected {e}"),
    }
}
