//! Nesting limit of the markup parser.

use mscript_parse::{parse_str, MAX_NESTING_DEPTH};

#[test]
fn moderate_nesting_works() {
    let mut src = String::new();
    for _ in 0..50 {
        src.push_str("<block>");
    }
    for _ in 0..50 {
        src.push_str("</block>");
    }
    assert!(parse_str("<test>", &src).is_ok(), "50 nested blocks should parse");
}

#[test]
fn nesting_limit_is_reasonable() {
    assert!(MAX_NESTING_DEPTH >= 64);
}
