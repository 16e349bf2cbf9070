//! End-to-end tests: markup text through parse, link and execute.

use std::sync::{Arc, Mutex};

use mscript_cli::eval::{run_execute, Env, RuntimeError, MAX_CALL_DEPTH};
use mscript_cli::host::{HostError, HostRegistry};
use mscript_cli::mission::{Mission, MissionState, DIRECTOR};
use mscript_cli::value::Value;
use mscript_link::{link_mission, run_link};
use mscript_parse::parse_str;

fn recorder(reg: &mut HostRegistry) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    reg.register("_test", "log", move |args: &[Value]| {
        let line: Vec<String> = args.iter().map(Value::to_text).collect();
        sink.lock().unwrap().push(line.join(" "));
        Ok(Value::Void)
    });
    log
}

#[test]
fn linked_tree_executes_repeatedly() {
    let mut host = HostRegistry::new();
    let log = recorder(&mut host);
    let node = parse_str(
        "<test>",
        r#"<block>
             <defvar name="i" type="int" value="0"/>
             <while>
               <test test="lt"><var name="i"/><const type="int" value="2"/></test>
               <block>
                 <call module="_test" name="log"><var name="i"/></call>
                 <setvar name="i">
                   <fmath math="+"><var name="i"/><const type="int" value="1"/></fmath>
                 </setvar>
               </block>
             </while>
           </block>"#,
    )
    .unwrap();
    let stmt = run_link(&node).unwrap();

    // each run gets its own environment; the linked tree is reused untouched
    run_execute(&stmt, &mut Env::new(), &host).unwrap();
    run_execute(&stmt, &mut Env::new(), &host).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["0", "1", "0", "1"]);
    assert_eq!(run_link(&node).unwrap(), stmt);
}

#[test]
fn root_block_bindings_stay_in_the_environment() {
    let host = HostRegistry::new();
    let define = run_link(
        &parse_str("<test>", r#"<block><defvar name="hp" type="int" value="100"/></block>"#).unwrap(),
    )
    .unwrap();
    let damage = run_link(
        &parse_str(
            "<test>",
            r#"<setvar name="hp">
                 <fmath math="-"><var name="hp"/><const type="int" value="30"/></fmath>
               </setvar>"#,
        )
        .unwrap(),
    )
    .unwrap();

    let mut env = Env::new();
    run_execute(&define, &mut env, &host).unwrap();
    run_execute(&damage, &mut env, &host).unwrap();
    run_execute(&damage, &mut env, &host).unwrap();
    assert_eq!(env.get("hp"), Some(&Value::Int(40)));
}

#[test]
fn host_failure_surfaces_with_function_name() {
    let mut host = HostRegistry::new();
    host.register("_ship", "dock", |_: &[Value]| {
        Err(HostError::RuntimeError("no station in range".into()))
    });
    let stmt = run_link(&parse_str("<test>", r#"<call module="_ship" name="dock"/>"#).unwrap()).unwrap();

    let err = run_execute(&stmt, &mut Env::new(), &host).unwrap_err();
    assert!(matches!(err, RuntimeError::Host { ref function, .. } if function == "_ship.dock"));
    assert!(err.to_string().contains("no station in range"));
}

#[test]
fn escort_mission_runs_to_completion() {
    let mut host = HostRegistry::with_builtins();
    let log = recorder(&mut host);
    let program = link_mission(
        &parse_str(
            "<test>",
            r#"<mission name="escort">
                 <module name="director">
                   <defvar name="convoy" type="object"/>
                   <defvar name="turn" type="int" value="0"/>
                   <script name="initgame">
                     <setvar name="convoy">
                       <call module="_object" name="new"><const type="string" value="freighter"/></call>
                     </setvar>
                   </script>
                   <script name="gameloop">
                     <setvar name="turn">
                       <fmath math="+"><var name="turn"/><const type="int" value="1"/></fmath>
                     </setvar>
                     <if>
                       <exec module="rules" name="arrived"><var name="turn"/></exec>
                       <call module="_test" name="log">
                         <call module="_object" name="class"><var name="convoy"/></call>
                         <const type="string" value="arrived"/>
                       </call>
                       <block/>
                     </if>
                   </script>
                 </module>
                 <module name="rules">
                   <defvar name="distance" type="int" value="3"/>
                   <script name="arrived" type="bool">
                     <params><defvar name="turn" type="int"/></params>
                     <return><test test="eq"><var name="turn"/><var name="distance"/></test></return>
                   </script>
                 </module>
               </mission>"#,
        )
        .unwrap(),
    )
    .unwrap();

    let mut mission = Mission::load(program, host).unwrap();
    mission.start().unwrap();
    for _ in 0..5 {
        mission.tick().unwrap();
    }
    mission.finish().unwrap();

    assert_eq!(mission.state(), MissionState::Finished);
    assert_eq!(*log.lock().unwrap(), vec!["freighter arrived"]);
    assert_eq!(mission.env().global(DIRECTOR, "turn"), Some(&Value::Int(5)));
    assert!(matches!(
        mission.env().global(DIRECTOR, "convoy"),
        Some(Value::Object(o)) if o.class() == Some("freighter")
    ));
}

#[test]
fn runaway_gameloop_fails_cleanly_on_worker_thread() {
    let program = link_mission(
        &parse_str(
            "<test>",
            r#"<mission name="runaway">
                 <module name="director">
                   <script name="gameloop"><exec name="gameloop"/></script>
                 </module>
               </mission>"#,
        )
        .unwrap(),
    )
    .unwrap();
    let mut mission = Mission::load(program, HostRegistry::new()).unwrap();

    // default spawn stack size
    let (err, state) = std::thread::spawn(move || {
        mission.start().unwrap();
        let err = mission.tick().unwrap_err();
        (err, mission.state())
    })
    .join()
    .unwrap();

    assert!(matches!(
        err,
        RuntimeError::CallDepthExceeded { limit: MAX_CALL_DEPTH, .. }
    ));
    assert_eq!(state, MissionState::Failed);
}
