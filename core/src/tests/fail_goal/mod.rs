use crate::tests::run_err;
use crate::Error;

#[test]
fn test_goal() {
    match run_err(module_path!()) {
        Error::Goal {
            expected, context, ..
        } => {
            assert_eq!(expected, "Nat");
            assert_eq!(context, [("n".to_string(), "Nat".to_string())]);
        }
        e => panic!("unexpected {e}"),
    }
}
