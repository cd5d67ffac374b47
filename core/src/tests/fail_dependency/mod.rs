use crate::tests::run;
use crate::{Error, ErrorKind, ModuleStatus};

#[test]
fn test_failed_dependencies() {
    let (_, reports) = run(module_path!()).unwrap();
    let [base, unrelated, user] = &reports[..] else {
        panic!("expected three reports")
    };

    assert_eq!(base.status, ModuleStatus::Failed);
    let kinds = base.errors.iter().map(|e| e.kind()).collect::<Vec<_>>();
    assert_eq!(kinds, [ErrorKind::TypeMismatch, ErrorKind::DependencyFailed]);
    match &base.errors[1] {
        Error::DependencyFailed { name, failed, .. } => {
            assert_eq!(name, "usesBroken");
            assert_eq!(failed, "broken");
        }
        e => panic!("unexpected {e}"),
    }

    assert_eq!(unrelated.status, ModuleStatus::Checked);

    assert_eq!(user.status, ModuleStatus::Unreachable);
    match &user.errors[..] {
        [Error::DependencyFailed { name, failed, .. }] => {
            assert_eq!(name, "user");
            assert_eq!(failed, "base");
        }
        e => panic!("unexpected {e:?}"),
    }
}
