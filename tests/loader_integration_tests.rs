mod common;

use common::Harness;
use luacm::loader::{CacheEntry, LoadError};

#[test]
fn test_module_loaded_twice_executes_once() {
    let h = Harness::new(&[
        (
            "main.lua",
            r#"
            local cm = load("luacm")
            local a = load("lib/counter.lua")
            local b = load("lib/counter.lua")
            cm.write{ name = "same", str = tostring(rawequal(a, b)) }
            "#,
        ),
        (
            "lib/counter.lua",
            r#"
            local cm = load("luacm")
            cm.write{ name = "loading", str = "counter ran" }
            value = 7
            "#,
        ),
    ]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "counter ran\ntrue\n");
}

#[test]
fn test_cycle_is_detected_and_names_the_path() {
    let h = Harness::new(&[
        ("a.lua", r#"load("b.lua")"#),
        ("b.lua", r#"load("a.lua")"#),
    ]);

    let err = h.run("a.lua").unwrap_err();

    assert_eq!(
        err,
        LoadError::Cycle {
            path: "/ws/a.lua".to_string()
        }
    );
    assert_eq!(err.to_string(), "cycle in load graph \"/ws/a.lua\"");
    assert!(matches!(
        h.loader.cache_entry("/ws/b.lua"),
        Some(CacheEntry::Failed(LoadError::Cycle { .. }))
    ));
}

#[test]
fn test_self_load_is_a_cycle() {
    let h = Harness::new(&[("main.lua", r#"load("main.lua")"#)]);
    assert!(matches!(h.run("main.lua"), Err(LoadError::Cycle { .. })));
}

#[test]
fn test_bindings_are_top_level_names() {
    let h = Harness::new(&[
        (
            "main.lua",
            r#"
            local vars = load("vars.lua")
            local cm = load("luacm")
            cm.write{ name = "port", str = tostring(vars.port) }
            cm.write{ name = "greet", str = vars.greet("ops") }
            cm.write{ name = "hidden", str = tostring(vars.hidden) }
            "#,
        ),
        (
            "vars.lua",
            r#"
            port = 8080
            local hidden = "secret"
            function greet(who) return "hello " .. who end
            "#,
        ),
    ]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "8080\nhello ops\nnil\n");
}

#[test]
fn test_modules_do_not_leak_globals_into_each_other() {
    let h = Harness::new(&[
        (
            "main.lua",
            r#"
            load("a.lua")
            local cm = load("luacm")
            cm.write{ name = "leak", str = tostring(shared) }
            "#,
        ),
        ("a.lua", "shared = 1"),
    ]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "nil\n");
}

#[test]
fn test_non_lua_reference_rejected_before_io() {
    let h = Harness::new(&[("main.lua", r#"load("helpers.star")"#)]);

    let err = h.run("main.lua").unwrap_err();

    assert!(matches!(err, LoadError::BadExtension { ref reference, .. } if reference == "helpers.star"));
}

#[test]
fn test_caller_relative_and_workspace_references() {
    let h = Harness::new(&[
        ("main.lua", r#"load("roles/web/init.lua")"#),
        (
            "roles/web/init.lua",
            r#"
            local cm = load("luacm")
            local local_vars = load("vars.lua")
            local common = load("//lib/common.lua")
            cm.write{ name = "vals", str = local_vars.role .. "," .. common.site }
            "#,
        ),
        ("roles/web/vars.lua", r#"role = "web""#),
        ("lib/common.lua", r#"site = "eu-1""#),
    ]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "web,eu-1\n");
}

#[test]
fn test_syntax_error_carries_path() {
    let h = Harness::new(&[
        ("main.lua", r#"load("broken.lua")"#),
        ("broken.lua", "local = = 3"),
    ]);

    let err = h.run("main.lua").unwrap_err();

    assert!(matches!(err, LoadError::Syntax { ref path, .. } if path == "/ws/broken.lua"));
}

#[test]
fn test_evaluation_error_has_backtrace() {
    let h = Harness::new(&[("main.lua", r#"error("boom")"#)]);

    let err = h.run("main.lua").unwrap_err();

    match &err {
        LoadError::Evaluation { path, message, .. } => {
            assert_eq!(path, "/ws/main.lua");
            assert!(message.contains("boom"));
        }
        other => panic!("expected evaluation error, got {other:?}"),
    }
    assert!(err.backtrace().is_some());
}

#[test]
fn test_failed_module_fails_every_importer() {
    let h = Harness::new(&[
        (
            "main.lua",
            r#"
            local ok, err = pcall(load, "bad.lua")
            local cm = load("luacm")
            cm.write{ name = "first", str = tostring(ok) }
            load("bad.lua")
            "#,
        ),
        ("bad.lua", r#"error("bad module")"#),
    ]);

    let err = h.run("main.lua").unwrap_err();

    assert_eq!(h.output(), "false\n");
    assert!(matches!(err, LoadError::Evaluation { ref path, .. } if path == "/ws/bad.lua"));
}

#[test]
fn test_missing_file_is_io_error() {
    let h = Harness::new(&[("main.lua", r#"load("nowhere.lua")"#)]);

    let err = h.run("main.lua").unwrap_err();

    assert!(matches!(err, LoadError::Io { ref path, .. } if path == "/ws/nowhere.lua"));
}

#[test]
fn test_sandbox_removes_host_access() {
    let h = Harness::new(&[(
        "main.lua",
        r#"
        local cm = load("luacm")
        cm.write{ name = "io", str = type(io) }
        cm.write{ name = "os", str = type(os) }
        cm.write{ name = "dofile", str = type(dofile) }
        cm.write{ name = "random", str = type(math.random) }
        cm.write{ name = "floor", str = type(math.floor) }
        "#,
    )]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "nil\nnil\nnil\nnil\nfunction\n");
}

#[test]
fn test_missing_caller_relative_module_names_caller_path() {
    let h = Harness::new(&[
        ("main.lua", r#"load("roles/web/init.lua")"#),
        ("roles/web/init.lua", r#"load("common.lua")"#),
        ("common.lua", r#"site = "eu-1""#),
    ]);

    let err = h.run("main.lua").unwrap_err();

    assert!(
        matches!(err, LoadError::Io { ref path, .. } if path == "/ws/roles/web/common.lua"),
        "{err:?}"
    );
}

#[test]
fn test_relative_load_inside_function_uses_defining_script() {
    let h = Harness::new(&[
        (
            "main.lua",
            r#"
            local cm = load("luacm")
            local roles = load("roles/loader.lua")
            cm.write{ name = "role", str = roles.vars().role }
            "#,
        ),
        (
            "roles/loader.lua",
            r#"function vars() return load("vars.lua") end"#,
        ),
        ("roles/vars.lua", r#"role = "db""#),
    ]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "db\n");
}

#[test]
fn test_bindings_are_read_only_for_importers() {
    let h = Harness::new(&[
        (
            "main.lua",
            r#"
            local cm = load("luacm")
            local vars = load("vars.lua")
            local ok, err = pcall(function() vars.port = 1 end)
            local again = load("vars.lua")
            local names = {}
            for k in pairs(vars) do names[#names + 1] = k end
            table.sort(names)
            cm.write{ name = "assign", str = tostring(ok) .. " " .. tostring(again.port) }
            cm.write{ name = "reason", str = tostring(err) }
            cm.write{ name = "names", str = table.concat(names, ",") }
            cm.write{ name = "global", str = tostring(vars.print) }
            "#,
        ),
        ("vars.lua", "port = 8080\nregion = \"eu\""),
    ]);

    h.run("main.lua").unwrap();

    let output = h.output();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "false 8080");
    assert!(lines[1].contains("module bindings are read-only"), "{output}");
    assert_eq!(lines[2], "port,region");
    assert_eq!(lines[3], "nil");
}

#[test]
fn test_builtin_bindings_are_read_only() {
    let h = Harness::new(&[(
        "main.lua",
        r#"
        local cm = load("luacm")
        local ok = pcall(function() cm.write = nil end)
        cm.write{ name = "report", str = tostring(ok) }
        "#,
    )]);

    h.run("main.lua").unwrap();

    assert_eq!(h.output(), "false\n");
}
