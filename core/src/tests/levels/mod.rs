use crate::tests::check_src;
use crate::Error;

fn parse_error(src: &str) -> String {
    match check_src(src) {
        Err(Error::Parsing(e)) => e.variant.message().to_string(),
        Err(e) => panic!("unexpected {e}"),
        Ok(_) => panic!("expected a parse error"),
    }
}

fn level_error(src: &str) -> String {
    match check_src(src) {
        Err(Error::LevelInconsistency(msg, _)) => msg,
        Err(e) => panic!("unexpected {e}"),
        Ok(_) => panic!("expected inconsistent levels"),
    }
}

const BOX: &str = r"\data Box (A : \Type) | box A
";

#[test]
fn test_infinity_not_predicative() {
    assert_eq!(
        parse_error(r"\func U => \Type \oo \oo"),
        r"\oo is not a predicative level"
    );
    assert_eq!(
        parse_error(r"\func U => \Type (\max 1 \oo) 0"),
        r"\oo is not a predicative level"
    );
    assert!(check_src(r"\func U => \Type 0 \oo").is_ok());
}

#[test]
fn test_misplaced_level_params() {
    assert_eq!(
        parse_error(r"\func F (X : \Type \lh 0) => X"),
        r"\lh in a predicative level"
    );
    assert_eq!(
        parse_error(r"\func F (X : \Type 0 (\suc \lp)) => X"),
        r"\lp in a homotopy level"
    );
    assert!(check_src(r"\func F (X : \Type (\suc \lp) (\max \lh 1)) => X").is_ok());
}

#[test]
fn test_numeral_overflow() {
    assert_eq!(
        parse_error(r"\func big : Nat => 18446744073709551616"),
        "18446744073709551616 is too large"
    );
    assert_eq!(
        parse_error(
            r"\func f (n : Nat) : Nat \with
  | 99999999999999999999 => 0
  | _ => 1"
        ),
        "99999999999999999999 is too large"
    );
    assert_eq!(
        parse_error(r"\func T => \Type 4294967296 0"),
        "4294967296 is too large"
    );
    assert_eq!(
        parse_error(r"\func T => \Type (\suc 4294967295) 0"),
        "level is too large"
    );
}

#[test]
fn test_top_level_has_no_universe() {
    assert!(level_error(r"\func T => \Type 4294967295 0").starts_with("no universe contains"));
    assert!(check_src(r"\func T => \Type 4294967294 0").is_ok());
}

#[test]
fn test_bound_by_max() {
    assert!(check_src(&format!(
        r"{BOX}\func K : \Type (\max \lp 5) 1 => Box (\Type 0 0)"
    ))
    .is_ok());
    assert!(check_src(&format!(
        r"{BOX}\func K : \Type (\max (\suc \lp) 5) 2 => Box (\Type \lp 1)"
    ))
    .is_ok());
    level_error(&format!(
        r"{BOX}\func K : \Type (\max \lp 2) 1 => Box (\Type 3 0)"
    ));
}
