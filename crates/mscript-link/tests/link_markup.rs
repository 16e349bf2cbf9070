//! Integration tests: markup text through the parser into the link pass.

use mscript_ast::ast::Stmt;
use mscript_link::{link_mission, run_link, Arity, LinkError};
use mscript_parse::parse_str;

#[test]
fn countdown_script_links() {
    let src = r#"
        <while>
            <test test="gt"><var name="x"/><const type="int" value="0"/></test>
            <if>
                <test test="gt"><var name="x"/><const type="int" value="0"/></test>
                <setvar name="x">
                    <fmath math="-"><var name="x"/><const type="int" value="1"/></fmath>
                </setvar>
                <return/>
            </if>
        </while>
    "#;
    let node = parse_str("<test>", src).expect("parse failed");
    let Stmt::While(w) = run_link(&node).expect("link failed") else {
        panic!("expected while");
    };
    assert!(matches!(w.body, Stmt::If(_)));
}

#[test]
fn arity_error_points_at_the_offending_node() {
    let src = "<block>\n  <if><const type=\"bool\" value=\"true\"/><block/></if>\n</block>";
    let node = parse_str("<test>", src).expect("parse failed");
    let err = run_link(&node).unwrap_err();
    match &err {
        LinkError::Arity {
            tag,
            expected,
            found,
            span,
        } => {
            assert_eq!(tag, "if");
            assert_eq!(*expected, Arity::Exactly(3));
            assert_eq!(*found, 2);
            assert_eq!(&src[span.start as usize..span.start as usize + 4], "<if>");
        }
        other => panic!("expected arity error, got {:?}", other),
    }
}

#[test]
fn full_mission_document_links() {
    let src = r#"<?xml version="1.0"?>
        <mission name="demo">
          <module name="director">
            <defvar name="ticks" type="int" value="0"/>
            <script name="initgame">
              <call module="_std" name="print"><const type="string" value="start"/></call>
            </script>
            <script name="gameloop">
              <setvar name="ticks">
                <exec name="inc"><var name="ticks"/></exec>
              </setvar>
            </script>
            <script name="inc" type="int">
              <params><defvar name="n" type="int"/></params>
              <return><fmath math="+"><var name="n"/><const type="int" value="1"/></fmath></return>
            </script>
          </module>
        </mission>
    "#;
    let node = parse_str("<test>", src).expect("parse failed");
    let program = link_mission(&node).expect("link failed");
    let director = program.module("director").expect("director module");
    assert_eq!(director.scripts.len(), 3);
}
