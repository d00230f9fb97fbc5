// End-to-end runs through SuiteRunner, observed with an EventLog

use oktest::prelude::*;
use oktest::report::{ClassHook, ReportEvent};
use oktest::{FixtureValue, Outcome, OutcomeKind, TestFilter};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: &str) {
    log.borrow_mut().push(entry.to_string());
}

fn run(suite: &Suite) -> EventLog {
    run_with(suite, RunConfig::default())
}

fn run_with(suite: &Suite, config: RunConfig) -> EventLog {
    let mut log = EventLog::new();
    SuiteRunner::new(config).run_all(suite, &mut log);
    log
}

fn kind_of(log: &EventLog, label: &str) -> OutcomeKind {
    log.outcome(label)
        .unwrap_or_else(|| panic!("no outcome for '{}'", label))
        .kind()
}

#[test]
fn test_assertion_error_and_skip_are_classified() {
    let mut class = TestClass::<()>::new("OutcomeTest");
    class.test("assertion fails", (), |_| ok(1).eq(2));
    class.test("std assert fails", (), |_| {
        std::assert_eq!(std::hint::black_box(1) + 1, 3);
        Ok(())
    });
    class.test("std assert with message fails", (), |_| {
        let v = std::hint::black_box(1);
        assert!(v == 2, "value should be two, got {}", v);
        Ok(())
    });
    class.test("divides by zero", (), |_| {
        let zero = std::hint::black_box(0_i32);
        let _ = 1 / zero;
        Ok(())
    });
    class.test("returns an error", (), |_| {
        let _: u8 = "x".parse()?;
        Ok(())
    });
    class.test("skips", (), |_| skip("requires network: see #42"));

    let log = run(&Suite::new().with(class));

    assert_eq!(kind_of(&log, "assertion fails"), OutcomeKind::Failed);
    assert_eq!(kind_of(&log, "std assert fails"), OutcomeKind::Failed);
    assert_eq!(kind_of(&log, "std assert with message fails"), OutcomeKind::Error);
    assert_eq!(
        log.outcome("std assert with message fails").unwrap().outcome.message(),
        Some("panicked: value should be two, got 1")
    );
    assert_eq!(kind_of(&log, "divides by zero"), OutcomeKind::Error);
    assert_eq!(kind_of(&log, "returns an error"), OutcomeKind::Error);
    assert_eq!(
        log.outcome("skips").unwrap().outcome,
        Outcome::Skipped {
            reason: "requires network: see #42".to_string()
        }
    );
    assert_eq!(
        log.outcome("assertion fails").unwrap().outcome.message(),
        Some("1 == 2: failed.")
    );
    assert!(log
        .outcome("divides by zero")
        .unwrap()
        .outcome
        .message()
        .unwrap()
        .contains("divide by zero"));
}

#[test]
fn test_before_all_failure_errors_every_method_and_still_runs_after_all() {
    let after_all = Rc::new(Cell::new(0));
    let bodies = Rc::new(Cell::new(0));

    let mut broken = TestClass::<()>::new("BrokenTest");
    let counter = Rc::clone(&after_all);
    broken
        .before_all(|| anyhow::bail!("schema missing"))
        .after_all(move || {
            counter.set(counter.get() + 1);
            Ok(())
        });
    for description in ["first", "second", "third"] {
        let bodies = Rc::clone(&bodies);
        broken.test(description, (), move |_| {
            bodies.set(bodies.get() + 1);
            Ok(())
        });
    }
    let mut healthy = TestClass::<()>::new("HealthyTest");
    healthy.test("still runs", (), |_| Ok(()));

    let log = run(&Suite::new().with(broken).with(healthy));

    for label in ["first", "second", "third"] {
        assert_eq!(kind_of(&log, label), OutcomeKind::Error);
        assert!(log
            .outcome(label)
            .unwrap()
            .outcome
            .message()
            .unwrap()
            .contains("schema missing"));
    }
    assert_eq!(bodies.get(), 0);
    assert_eq!(after_all.get(), 1);
    assert_eq!(kind_of(&log, "still runs"), OutcomeKind::Passed);
    assert!(log.events().iter().any(|e| matches!(
        e,
        ReportEvent::ClassHookError { hook: ClassHook::BeforeAll, class, .. } if class == "BrokenTest"
    )));
}

#[test]
fn test_deferred_callbacks_then_releasers_then_after_each() {
    let log = new_log();
    let mut class = TestClass::<()>::new("CleanupTest");

    let l = Rc::clone(&log);
    class.provide("db", (), move |_| {
        push(&l, "provide db");
        Ok(String::from("db"))
    });
    let l = Rc::clone(&log);
    class.release("db", (), move |_: &String, _| {
        push(&l, "release db");
        Ok(())
    });
    let l = Rc::clone(&log);
    class.after_each(move |_| {
        push(&l, "after_each");
        Ok(())
    });
    let l = Rc::clone(&log);
    class.test("defers twice", ["db"], move |cx| {
        push(&l, "body");
        let a = Rc::clone(&l);
        cx.at_end(move || {
            push(&a, "A");
            Ok(())
        });
        let b = Rc::clone(&l);
        cx.at_end(move || {
            push(&b, "B");
            Ok(())
        });
        Ok(())
    });

    let events = run(&Suite::new().with(class));

    assert_eq!(kind_of(&events, "defers twice"), OutcomeKind::Passed);
    assert_eq!(
        *log.borrow(),
        vec!["provide db", "body", "B", "A", "release db", "after_each"]
    );
}

#[test]
fn test_deferred_callbacks_run_even_when_the_body_fails() {
    let log = new_log();
    let mut class = TestClass::<()>::new("CleanupTest");
    let l = Rc::clone(&log);
    class.test("fails after deferring", (), move |cx| {
        let a = Rc::clone(&l);
        cx.at_end(move || {
            push(&a, "A");
            Ok(())
        });
        fail("boom")
    });

    let events = run(&Suite::new().with(class));
    assert_eq!(kind_of(&events, "fails after deferring"), OutcomeKind::Failed);
    assert_eq!(*log.borrow(), vec!["A"]);
}

#[rstest]
#[case::failing_body("fails", false)]
#[case::erroring_body("errors", true)]
fn test_cleanup_order_holds_when_the_body_does_not_pass(#[case] description: &str, #[case] errors: bool) {
    let log = new_log();
    let mut class = TestClass::<()>::new("CleanupTest");

    let l = Rc::clone(&log);
    class.provide("db", (), move |_| {
        push(&l, "provide db");
        Ok(String::from("db"))
    });
    let l = Rc::clone(&log);
    class.release("db", (), move |_: &String, _| {
        push(&l, "release db");
        Ok(())
    });
    let l = Rc::clone(&log);
    class.after_each(move |_| {
        push(&l, "after_each");
        Ok(())
    });
    let l = Rc::clone(&log);
    class.test(description, ["db"], move |cx| {
        push(&l, "body");
        let a = Rc::clone(&l);
        cx.at_end(move || {
            push(&a, "A");
            Ok(())
        });
        if errors {
            anyhow::bail!("connection reset")
        }
        fail("1 == 2: failed.")
    });

    let events = run(&Suite::new().with(class));

    let expected = if errors { OutcomeKind::Error } else { OutcomeKind::Failed };
    assert_eq!(kind_of(&events, description), expected);
    assert_eq!(
        *log.borrow(),
        vec!["provide db", "body", "A", "release db", "after_each"]
    );
}

#[test]
fn test_elapsed_covers_the_body_only() {
    let pause = std::time::Duration::from_millis(50);
    let mut class = TestClass::<()>::new("TimingTest");
    class.provide("slow", (), |_| Ok(()));
    class.release("slow", (), move |_: &(), _| {
        std::thread::sleep(pause);
        Ok(())
    });
    class.test("quick body", ["slow"], move |cx| {
        cx.at_end(move || {
            std::thread::sleep(pause);
            Ok(())
        });
        Ok(())
    });

    let log = run(&Suite::new().with(class));
    let outcome = log.outcome("quick body").unwrap();
    let totals = log.totals().unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Passed);
    assert!(outcome.elapsed < pause, "{:?}", outcome.elapsed);
    assert!(totals.elapsed() >= pause * 2, "{:?}", totals.elapsed());
}

#[test]
fn test_panicking_factory_is_an_error_and_the_run_continues() {
    let mut fragile = TestClass::<String>::with_factory("FragileTest", || panic!("cannot open socket"));
    fragile.test("needs an instance", (), |_| Ok(()));
    let mut healthy = TestClass::<()>::new("HealthyTest");
    healthy.test("still runs", (), |_| Ok(()));

    let log = run(&Suite::new().with(fragile).with(healthy));

    assert_eq!(kind_of(&log, "needs an instance"), OutcomeKind::Error);
    let message = log
        .outcome("needs an instance")
        .unwrap()
        .outcome
        .message()
        .unwrap()
        .to_string();
    assert!(message.contains("cannot instantiate test class FragileTest"), "{}", message);
    assert!(message.contains("cannot open socket"), "{}", message);
    assert_eq!(kind_of(&log, "still runs"), OutcomeKind::Passed);
    assert_eq!(log.totals().unwrap().total(), 2);
}

#[test]
fn test_totals_count_every_bucket() {
    let mut class = TestClass::<()>::new("TotalsTest");
    class.test("pass 1", (), |_| Ok(()));
    class.test("pass 2", (), |_| ok(true).is_true());
    class.test("fail 1", (), |_| fail("nope"));
    class.test("fail 2", (), |_| ok("abc").contains("x"));
    class.test("error", (), |_| anyhow::bail!("connection refused"));
    class.test("skip", (), |_| skip("later"));
    class.todo("todo", (), |_| ok(1).eq(2));

    let log = run(&Suite::new().with(class));
    let totals = log.totals().unwrap();

    assert_eq!(totals.total(), 7);
    assert_eq!(totals.count(OutcomeKind::Passed), 2);
    assert_eq!(totals.count(OutcomeKind::Failed), 2);
    assert_eq!(totals.count(OutcomeKind::Error), 1);
    assert_eq!(totals.count(OutcomeKind::Skipped), 1);
    assert_eq!(totals.count(OutcomeKind::TodoExpectedFailure), 1);
    assert_eq!(totals.count(OutcomeKind::TodoUnexpectedSuccess), 0);
    assert_eq!(totals.exit_code(), 1);
}

#[test]
fn test_todo_that_passes_fails_the_suite() {
    let mut class = TestClass::<()>::new("TodoTest");
    class.todo("not implemented yet", (), |_| Ok(()));

    let log = run(&Suite::new().with(class));
    assert_eq!(
        kind_of(&log, "not implemented yet"),
        OutcomeKind::TodoUnexpectedSuccess
    );
    assert!(!log.totals().unwrap().is_success());
}

#[test]
fn test_shared_fixture_is_built_once_and_identical_for_consumers() {
    let built = Rc::new(Cell::new(0));
    let mut class = TestClass::<()>::new("SharedTest");

    let counter = Rc::clone(&built);
    class.provide("conn", (), move |_| {
        counter.set(counter.get() + 1);
        Ok(String::from("conn"))
    });
    class.provide("users", ["conn"], |args| args.value("conn"));
    class.provide("orders", ["conn"], |args| args.value("conn"));
    class.test("shares", ["users", "orders", "conn"], |cx| {
        let users = cx.arg::<FixtureValue>("users")?;
        let orders = cx.arg::<FixtureValue>("orders")?;
        let conn = cx.value("conn")?;
        ok(Rc::ptr_eq(users, &conn)).is_true()?;
        ok(Rc::ptr_eq(orders, &conn)).is_true()
    });

    let log = run(&Suite::new().with(class));
    assert_eq!(kind_of(&log, "shares"), OutcomeKind::Passed);
    assert_eq!(built.get(), 1);
}

#[test]
fn test_looped_dependency_names_the_path_class_and_test() {
    let mut class = TestClass::<()>::new("LoopTest");
    class.provide("a", ["b"], |_| Ok(()));
    class.provide("b", ["e"], |_| Ok(()));
    class.provide("e", ["g"], |_| Ok(()));
    class.provide("g", ["b"], |_| Ok(()));
    class.test("loops", ["a"], |_| Ok(()));

    let log = run(&Suite::new().with(class));
    let outcome = log.outcome("loops").unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Error);
    let message = outcome.outcome.message().unwrap();
    assert!(message.contains("a->b=>e=>g=>b"), "{}", message);
    assert!(message.contains("LoopTest"), "{}", message);
    assert!(message.contains("'loops'"), "{}", message);
}

#[test]
fn test_missing_fixture_releases_what_was_built() {
    let log = new_log();
    let mut class = TestClass::<()>::new("MissingTest");
    class.provide("db", (), |_| Ok(1_u8));
    let l = Rc::clone(&log);
    class.release("db", (), move |_: &u8, _| {
        push(&l, "release db");
        Ok(())
    });
    class.test("needs ghost", ["db", "ghost"], |_| Ok(()));

    let events = run(&Suite::new().with(class));
    let outcome = events.outcome("needs ghost").unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Error);
    assert!(outcome.outcome.message().unwrap().contains("fixture 'ghost' not found"));
    assert_eq!(*log.borrow(), vec!["release db"]);
}

#[test]
fn test_skip_still_releases_fixtures() {
    let log = new_log();
    let mut class = TestClass::<()>::new("SkipTest");
    class.provide("tmp", (), |_| Ok(()));
    let l = Rc::clone(&log);
    class.release("tmp", (), move |_: &(), _| {
        push(&l, "release tmp");
        Ok(())
    });
    class.test("skips late", ["tmp"], |_| skip("not today"));

    let events = run(&Suite::new().with(class));
    assert_eq!(kind_of(&events, "skips late"), OutcomeKind::Skipped);
    assert_eq!(*log.borrow(), vec!["release tmp"]);
}

#[test]
fn test_releaser_failure_turns_a_pass_into_an_error() {
    let mut class = TestClass::<()>::new("ReleaseTest");
    class.provide("file", (), |_| Ok(()));
    class.release("file", (), |_: &(), _| anyhow::bail!("permission denied"));
    class.test("writes", ["file"], |_| Ok(()));
    class.test("after", (), |_| Ok(()));

    let log = run(&Suite::new().with(class));
    let outcome = log.outcome("writes").unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Error);
    assert_eq!(outcome.cleanup_errors.len(), 1);
    assert!(outcome.cleanup_errors[0].contains("permission denied"));
    assert_eq!(kind_of(&log, "after"), OutcomeKind::Passed);
}

#[test]
fn test_one_failure_never_stops_the_run() {
    let mut first = TestClass::<()>::new("FirstTest");
    first.test("panics", (), |_| panic!("unexpected"));
    first.test("runs anyway", (), |_| Ok(()));
    let mut second = TestClass::<()>::new("SecondTest");
    second.test("also runs", (), |_| Ok(()));

    let log = run(&Suite::new().with(first).with(second));
    assert_eq!(kind_of(&log, "panics"), OutcomeKind::Error);
    assert_eq!(kind_of(&log, "runs anyway"), OutcomeKind::Passed);
    assert_eq!(kind_of(&log, "also runs"), OutcomeKind::Passed);
    assert_eq!(log.outcomes().count(), 3);
}

#[derive(Default)]
struct DbTest {
    opened: u32,
    prepared: bool,
}

#[test]
fn test_each_invocation_gets_a_fresh_instance() {
    let mut class = TestClass::<DbTest>::new("DbTest");
    class.before_each(|s| {
        s.prepared = true;
        Ok(())
    });
    class.provide_bound("conn", (), |s, _| {
        s.opened += 1;
        Ok(s.opened)
    });
    for description in ["first", "second"] {
        class.test(description, ["conn"], |cx| {
            ok(*cx.arg::<u32>("conn")?).eq(1)?;
            ok(cx.state.prepared).is_true()
        });
    }

    let log = run(&Suite::new().with(class));
    assert_eq!(kind_of(&log, "first"), OutcomeKind::Passed);
    assert_eq!(kind_of(&log, "second"), OutcomeKind::Passed);
}

#[test]
fn test_delegate_supplies_unknown_fixtures() {
    let released = Rc::new(Cell::new(false));
    let flag = Rc::clone(&released);
    let delegate = DelegateFixtures::new()
        .provide("clock", || Ok(1_700_000_000_u64))
        .release("clock", move |_: &u64| {
            flag.set(true);
            Ok(())
        });

    let mut class = TestClass::<()>::new("ClockTest");
    class.provide("stamp", ["clock"], |args| Ok(*args.get::<u64>("clock")? + 1));
    class.test("reads the clock", ["stamp"], |cx| ok(*cx.arg::<u64>("stamp")?).eq(1_700_000_001));

    let log = run_with(
        &Suite::new().with(class),
        RunConfig::default().with_delegate(delegate),
    );
    assert_eq!(kind_of(&log, "reads the clock"), OutcomeKind::Passed);
    assert!(released.get());
}

#[test]
fn test_param_default_short_circuits_resolution() {
    let mut class = TestClass::<()>::new("DefaultTest");
    class.test(
        "uses default",
        [Param::new("name"), Param::with_default("greeting", String::from("hi"))],
        |cx| ok(format!("{} {}", cx.arg::<String>("greeting")?, cx.arg::<String>("name")?)).eq("hi Haruhi"),
    );
    class.provide("name", (), |_| Ok(String::from("Haruhi")));

    let log = run(&Suite::new().with(class));
    assert_eq!(kind_of(&log, "uses default"), OutcomeKind::Passed);
}

#[test]
fn test_filtered_discovery_runs_only_matching_tests() {
    let ran = new_log();
    let mut class = TestClass::<()>::new("FilterTest");
    for description in ["parses json", "parses toml", "renders html"] {
        let ran = Rc::clone(&ran);
        class.test(description, (), move |_| {
            push(&ran, description);
            Ok(())
        });
    }
    let suite = Suite::new().with(class);

    let runner = SuiteRunner::default();
    let discovery = TestFilter::new("parses").apply(runner.discover(&suite));
    let mut log = EventLog::new();
    let totals = runner.run(&suite, &discovery, &mut log);

    assert_eq!(totals.total(), 2);
    assert_eq!(*ran.borrow(), vec!["parses json", "parses toml"]);
}

#[test]
fn test_subclass_inherits_fixtures_and_methods() {
    let mut base = TestClass::<()>::new("BaseTest");
    base.provide("answer", (), |_| Ok(42_i32));
    base.method("test_answer", ["answer"], |cx| ok(*cx.arg::<i32>("answer")?).eq(42));

    let mut child = TestClass::extends("ChildTest", &base);
    child.provide("answer", (), |_| Ok(43_i32));
    child.method("test_answer", ["answer"], |cx| ok(*cx.arg::<i32>("answer")?).eq(43));
    child.method("test_extra", ["answer"], |cx| ok(*cx.arg::<i32>("answer")?).gt(0));

    let log = run(&Suite::new().with(base).with(child));
    let results: Vec<(String, OutcomeKind)> = log
        .outcomes()
        .map(|o| (format!("{}.{}", o.id.class, o.id.name), o.kind()))
        .collect();
    assert_eq!(
        results,
        vec![
            ("BaseTest.test_answer".to_string(), OutcomeKind::Passed),
            ("ChildTest.test_answer".to_string(), OutcomeKind::Passed),
            ("ChildTest.test_extra".to_string(), OutcomeKind::Passed),
        ]
    );
}
