//! A step computes only when every one of its inputs is valid

use proptest::prelude::*;
use stepgraph::graph::{ComputeContext, DataType, SlotDeclarations};
use stepgraph::{DataValue, Group, Step, StepError, StepState, StepTime, Validity};

#[derive(Debug, Clone, Copy)]
enum Feed {
    Unconnected,
    Scalar,
    Text,
}

fn feed() -> impl Strategy<Value = Feed> {
    prop_oneof![Just(Feed::Unconnected), Just(Feed::Scalar), Just(Feed::Text)]
}

/// Inputs `in0..inN`; mandatory ones are declared with `input`.
struct Gated {
    mandatory: Vec<bool>,
}

impl Step for Gated {
    fn declare(&self, slots: &mut SlotDeclarations) {
        for (i, mandatory) in self.mandatory.iter().enumerate() {
            let name = format!("in{}", i);
            if *mandatory {
                slots.input(&name, DataType::Scalar);
            } else {
                slots.optional_input(&name, DataType::Scalar);
            }
        }
        slots.output("out", 0.0);
    }

    fn compute(&mut self, ctx: &mut ComputeContext<'_>) -> Result<(), StepError> {
        ctx.set_output("out", 1.0)
    }
}

struct Source(DataValue);

impl Step for Source {
    fn declare(&self, slots: &mut SlotDeclarations) {
        slots.output("out", self.0.clone());
    }

    fn compute(&mut self, _ctx: &mut ComputeContext<'_>) -> Result<(), StepError> {
        Ok(())
    }
}

proptest! {
    #[test]
    fn test_step_runs_iff_all_inputs_valid(
        inputs in prop::collection::vec((any::<bool>(), feed()), 1..6)
    ) {
        let group = Group::new("root").unwrap();
        let gated = group
            .add_step("gated", Gated { mandatory: inputs.iter().map(|(m, _)| *m).collect() })
            .unwrap();
        group.add_step("scalar", Source(DataValue::Scalar(2.0))).unwrap();
        group.add_step("text", Source(DataValue::Text("two".into()))).unwrap();

        for (i, (_, feed)) in inputs.iter().enumerate() {
            let target = format!("gated.in{}", i);
            match feed {
                Feed::Unconnected => {}
                Feed::Scalar => group.connect("scalar.out", &target).unwrap(),
                Feed::Text => group.connect("text.out", &target).unwrap(),
            }
        }

        gated.compute_once(StepTime::default());

        let expected: Vec<bool> = inputs
            .iter()
            .map(|(mandatory, feed)| match feed {
                Feed::Unconnected => !mandatory,
                Feed::Scalar => true,
                Feed::Text => false,
            })
            .collect();
        for (i, valid) in expected.iter().enumerate() {
            let validity = gated.validity(&format!("in{}", i)).unwrap();
            prop_assert_eq!(validity == Validity::Valid, *valid);
        }

        let all_valid = expected.iter().all(|v| *v);
        prop_assert_eq!(gated.compute_count(), u64::from(all_valid));
        let expected_state = if all_valid { StepState::Running } else { StepState::NotRunning };
        prop_assert_eq!(gated.state(), expected_state);
    }
}
