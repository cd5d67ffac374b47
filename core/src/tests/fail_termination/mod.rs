use crate::tests::run;
use crate::Error;

#[test]
fn test_non_structural() {
    let (_, reports) = run(module_path!()).unwrap();
    let names = reports[0]
        .errors
        .iter()
        .map(|e| match e {
            Error::NonTerminationRejected(f, _) => f.as_str(),
            e => panic!("unexpected {e}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(names, ["loop", "grow"]);
}
