//! Full node: bus command in, engine step, JPEG frame out.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use simbridge_hal::{KinematicSim, SimulationEngine, SimulatorConfig, StepOutcome};
use simbridge_middleware::EventBus;
use simbridge_runtime::{NodeConfig, SimulationWrapperNode};
use simbridge_types::{
    ActionVector, BridgeError, EventPayload, Frame, Joy, MAX_WHEEL_NORM, WheelsCmd,
};

/// Wraps the built-in simulator and records every action it is stepped with.
struct RecordingEngine {
    inner: KinematicSim,
    actions: Arc<Mutex<Vec<ActionVector>>>,
}

impl SimulationEngine for RecordingEngine {
    fn step(&mut self, action: ActionVector) -> Result<StepOutcome, BridgeError> {
        self.actions.lock().unwrap().push(action);
        self.inner.step(action)
    }

    fn render(&mut self) -> Result<Frame, BridgeError> {
        self.inner.render()
    }

    fn reset(&mut self) -> Result<Frame, BridgeError> {
        self.inner.reset()
    }
}

fn small_sim() -> KinematicSim {
    KinematicSim::new(SimulatorConfig {
        camera_width: 64,
        camera_height: 48,
        ..Default::default()
    })
    .unwrap()
}

fn close(a: ActionVector, b: ActionVector) -> bool {
    (a.left - b.left).abs() < 1e-9 && (a.right - b.right).abs() < 1e-9
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wheel_command_reaches_engine_and_frames_are_published() {
    let bus = EventBus::default();
    let actions = Arc::new(Mutex::new(Vec::new()));
    let engine = RecordingEngine {
        inner: small_sim(),
        actions: Arc::clone(&actions),
    };

    let node = SimulationWrapperNode::new(NodeConfig::default(), bus.clone(), engine).unwrap();
    assert_eq!(node.action_state().read(), ActionVector::ZERO);
    let topics = node.topics().clone();
    let mut images = bus.subscribe(&topics.image);
    let handle = node.start().unwrap();
    let state = handle.action_state();

    bus.publish(
        &topics.wheel_cmd,
        EventPayload::WheelsCmd(WheelsCmd {
            vel_left: 2.0,
            vel_right: 0.0,
        }),
    )
    .unwrap();

    let expected = ActionVector::new(MAX_WHEEL_NORM, 0.0);
    wait_for("clamped action in state", || close(state.read(), expected)).await;
    wait_for("engine stepped with clamped action", || {
        actions.lock().unwrap().iter().any(|a| close(*a, expected))
    })
    .await;

    let event = tokio::time::timeout(Duration::from_secs(2), images.recv())
        .await
        .expect("no frame within 2 s")
        .expect("image topic closed");
    match event.payload {
        EventPayload::CompressedImage(img) => {
            assert_eq!(img.format, "jpeg");
            assert_eq!(&img.data[..2], &[0xFF, 0xD8]);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let ticks = handle.shutdown().unwrap();
    assert!(ticks > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_joystick_message_keeps_previous_action() {
    let bus = EventBus::default();
    let node = SimulationWrapperNode::new(NodeConfig::default(), bus.clone(), small_sim()).unwrap();
    let topics = node.topics().clone();
    let handle = node.start().unwrap();
    let state = handle.action_state();

    bus.publish(
        &topics.joy,
        EventPayload::Joy(Joy {
            axes: vec![0.0, 1.0, 0.0, 1.0],
            buttons: vec![],
        }),
    )
    .unwrap();
    let expected = ActionVector::new(0.25, 0.75);
    wait_for("joystick action", || close(state.read(), expected)).await;

    bus.publish(
        &topics.joy,
        EventPayload::Joy(Joy {
            axes: vec![0.0, -1.0],
            buttons: vec![],
        }),
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(close(state.read(), expected));
    assert!(!handle.is_finished(), "loop must survive a bad command");

    handle.shutdown().unwrap();
}

#[test]
fn engine_failure_stops_the_node() {
    struct Broken;

    impl SimulationEngine for Broken {
        fn step(&mut self, _action: ActionVector) -> Result<StepOutcome, BridgeError> {
            Err(BridgeError::engine("step", "no physics"))
        }

        fn render(&mut self) -> Result<Frame, BridgeError> {
            unreachable!()
        }

        fn reset(&mut self) -> Result<Frame, BridgeError> {
            unreachable!()
        }
    }

    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let node = SimulationWrapperNode::new(NodeConfig::default(), EventBus::default(), Broken).unwrap();
    let handle = node.start().unwrap();
    let err = handle.join().unwrap_err();
    assert!(matches!(err, BridgeError::Engine { .. }));
}
