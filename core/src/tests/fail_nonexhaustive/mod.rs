use crate::tests::run;
use crate::{Error, ErrorKind};

#[test]
fn test_missing_constructor() {
    let (_, reports) = run(module_path!()).unwrap();
    let errors = reports
        .iter()
        .map(|r| (r.name(), &r.errors))
        .collect::<Vec<_>>();
    // Modules are reported in name order.
    assert_eq!(errors[0].0, "clauses");
    match &errors[0].1[..] {
        [Error::NonExhaustiveMatch { missing, .. }] => assert_eq!(missing, &["one", "three"]),
        e => panic!("unexpected {e:?}"),
    }
    assert_eq!(errors[1].0, "index");
    match &errors[1].1[..] {
        [Error::NonExhaustiveMatch { missing, .. }] => assert_eq!(missing, &["B"]),
        e => panic!("unexpected {e:?}"),
    }
    assert_eq!(errors[1].1[0].kind(), ErrorKind::NonExhaustiveMatch);
}
