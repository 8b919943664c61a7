//! Round propagation through data connections, triggered by hand so every
//! round is deterministic

mod common;

use common::builders::{scalar, step, GraphBuilder, Increment, Recorder, RejectNegative};
use common::{assert_float_eq, test_timeout};
use crossbeam_channel::{bounded, Receiver, Sender};
use stepgraph::graph::steps::{CONSTANT, COUNTER, STATIC_GAIN, SUM};
use stepgraph::graph::{ComputeContext, DataType, GraphEvent, SlotDeclarations};
use stepgraph::{Group, Step, StepError, StepNode, StepRegistry, StepState, StepTime, Validity};

fn fire(group: &Group, trigger: &str) -> u64 {
    group.trigger(trigger).unwrap().fire(StepTime::default())
}

#[test]
fn test_feedback_cycle_reads_previous_round() {
    let (recorder, seen) = Recorder::new();
    let group = GraphBuilder::new("root")
        .step("inc", Increment)
        .step("rec", recorder)
        .connect("inc.out", "rec.in")
        .connect("rec.out", "inc.feedback")
        .trigger("tick", &["inc"])
        .build();

    for _ in 0..5 {
        fire(&group, "tick");
    }

    assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    // the back edge reaches inc again in the same round; it computes only once
    assert_eq!(step(&group, "inc").compute_count(), 5);
    assert_eq!(step(&group, "rec").compute_count(), 5);
}

#[test]
fn test_diamond_first_arrival_wins() {
    let (left, _) = Recorder::new();
    let (right, _) = Recorder::new();
    let group = GraphBuilder::new("root")
        .builtin(COUNTER, "src")
        .step("left", left)
        .step("right", right)
        .builtin(SUM, "sum")
        .connect("src.out", "left.in")
        .connect("src.out", "right.in")
        .connect("left.out", "sum.a")
        .connect("right.out", "sum.b")
        .trigger("tick", &["src"])
        .build();

    for round in 1..=4 {
        fire(&group, "tick");
        // sum runs when left finishes, before right has produced this round's value
        assert_float_eq(scalar(&group, "sum.out"), (2 * round - 1) as f64, 1e-9);
    }
    assert_eq!(step(&group, "sum").compute_count(), 4);
}

#[test]
fn test_invalid_inputs_stop_propagation() {
    let (recorder, seen) = Recorder::new();
    let group = GraphBuilder::new("root")
        .builtin(STATIC_GAIN, "gain")
        .step("rec", recorder)
        .connect("gain.out", "rec.in")
        .trigger("tick", &["gain"])
        .build();
    let gain = step(&group, "gain");

    fire(&group, "tick");
    assert_eq!(gain.state(), StepState::NotRunning);
    assert!(gain.annotation().contains("in"));
    assert_eq!(gain.validity("in"), Some(Validity::Error));
    assert!(seen.lock().unwrap().is_empty());

    // connecting the input lets the next round through
    let registry = StepRegistry::with_builtins();
    let three = group.create_step(&registry, CONSTANT, "three").unwrap();
    three.set_parameter("value", 3.0).unwrap();
    three.compute_once(StepTime::default());
    group.connect("three.out", "gain.in").unwrap();
    fire(&group, "tick");
    assert_eq!(gain.state(), StepState::Running);
    assert_eq!(*seen.lock().unwrap(), vec![3.0]);
}

#[test]
fn test_exception_halts_step_but_not_round() {
    let (after, seen) = Recorder::new();
    let group = GraphBuilder::new("root")
        .builtin(CONSTANT, "src")
        .parameter("src", "value", -1.0)
        .step("check", RejectNegative)
        .step("after", after)
        .connect("src.out", "check.in")
        .connect("check.out", "after.in")
        .trigger("tick", &["src"])
        .build();
    let events = group.subscribe();
    let check = step(&group, "check");

    fire(&group, "tick");
    assert_eq!(check.state(), StepState::Exception);
    assert!(check.annotation().contains("negative input"));
    // downstream still ran in the failing round, with the old output
    assert_eq!(*seen.lock().unwrap(), vec![0.0]);

    // halted until reset
    fire(&group, "tick");
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(check.compute_count(), 0);

    step(&group, "src").set_parameter("value", 4.0).unwrap();
    check.reset_state();
    fire(&group, "tick");
    assert_eq!(check.state(), StepState::Running);
    assert_eq!(*seen.lock().unwrap(), vec![0.0, 4.0]);

    let failures: Vec<String> = events
        .try_iter()
        .filter_map(|e| match e {
            GraphEvent::ComputeFailed { step, .. } => Some(step),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec!["check"]);
}

#[test]
fn test_trigger_chaining() {
    let group = GraphBuilder::new("root")
        .builtin(COUNTER, "counter")
        .trigger("inner", &["counter"])
        .trigger("outer", &["inner"])
        .build();

    let round = fire(&group, "outer");
    assert_eq!(step(&group, "counter").compute_count(), 1);
    assert_eq!(group.trigger("inner").unwrap().last_round(), round);
}

#[test]
fn test_disconnect_stops_data_driven_propagation() {
    let (recorder, seen) = Recorder::new();
    let group = GraphBuilder::new("root")
        .builtin(COUNTER, "counter")
        .step("rec", recorder)
        .connect("counter.out", "rec.in")
        .trigger("tick", &["counter"])
        .build();

    fire(&group, "tick");
    group.disconnect("counter.out", "rec.in").unwrap();
    fire(&group, "tick");

    assert_eq!(*seen.lock().unwrap(), vec![1.0]);
    assert_eq!(step(&group, "rec").validity("in"), Some(Validity::NotSet));
    assert!(step(&group, "counter").finished_trigger().listener_names().is_empty());
}

/// Blocks in compute until released, to observe the busy flag.
struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Step for Gate {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.optional_input("in", DataType::Any).output("out", 0.0);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), StepError> {
        let _ = self.entered.send(());
        let _ = self.release.recv_timeout(test_timeout());
        ctx.set_output("out", ctx.round() as f64)
    }
}

#[test]
fn test_busy_step_ignores_new_rounds() {
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let node = StepNode::new(
        "gate",
        Gate {
            entered: entered_tx,
            release: release_rx,
        },
    )
    .unwrap();

    let worker = {
        let node = node.clone();
        std::thread::spawn(move || node.compute_once(StepTime::default()))
    };
    entered_rx.recv_timeout(test_timeout()).unwrap();
    assert!(node.is_busy());

    // a new round arriving while busy is dropped, not queued
    node.compute_once(StepTime::default());
    release_tx.send(()).unwrap();
    worker.join().unwrap();

    assert!(!node.is_busy());
    assert_eq!(node.compute_count(), 1);
    assert!(entered_rx.try_recv().is_err());
}
