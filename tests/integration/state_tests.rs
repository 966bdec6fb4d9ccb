//! State machine tests over long event streams

use claude_streamdeck::{HookEvent, Phase, StateMachine};
use parking_lot::Mutex;
use std::sync::Arc;

/// Small deterministic generator so failures reproduce
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next() % items.len() as u64) as usize]
    }
}

const TOOLS: &[&str] = &["Read", "Edit", "Bash", "WebFetch", "NotebookEdit"];

#[test]
fn test_random_streams_keep_invariants() {
    for seed in 1..=50u64 {
        let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut machine = StateMachine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        machine.add_listener(move |old, new, _| {
            sink.lock().push((old, new));
            Ok(())
        });

        for _ in 0..200 {
            let event = *rng.pick(&HookEvent::ALL);
            let tool = rng.pick(TOOLS);
            machine.process_event(event.as_str(), Some("session"), Some(tool));

            let ctx = machine.context();
            if machine.phase() == Phase::ToolRunning {
                assert!(ctx.in_tool(), "seed {} after {}", seed, event);
            }
            match event {
                HookEvent::SessionStart => assert_eq!(machine.phase(), Phase::Idle),
                HookEvent::SessionEnd => assert_eq!(machine.phase(), Phase::Inactive),
                HookEvent::Stop | HookEvent::SubagentStop => assert_eq!(ctx.tool_depth, 0),
                _ => {}
            }
        }

        // Notifications chain: each one starts where the previous ended
        let seen = seen.lock();
        let mut current = Phase::Inactive;
        for &(old, new) in seen.iter() {
            assert_eq!(old, current, "seed {}", seed);
            assert!(old != new || new == Phase::ToolRunning, "seed {}", seed);
            current = new;
        }
        assert_eq!(current, machine.phase(), "seed {}", seed);
    }
}

#[test]
fn test_unknown_events_change_nothing() {
    let mut machine = StateMachine::new();
    machine.process_event("SessionStart", Some("abc"), None);
    machine.process_event("UserPromptSubmit", None, None);
    let before = machine.context().clone();

    for tag in ["", "sessionstart", "ToolUse", "Stop ", "PreToolUse\n"] {
        machine.process_event(tag, Some("other"), Some("Bash"));
    }

    assert_eq!(machine.context(), &before);
}

#[test]
fn test_typical_session() {
    let mut machine = StateMachine::new();
    let steps: &[(&str, Option<&str>, Phase)] = &[
        ("SessionStart", None, Phase::Idle),
        ("UserPromptSubmit", None, Phase::Thinking),
        ("PreToolUse", Some("Read"), Phase::ToolRunning),
        ("PreToolUse", Some("Task"), Phase::ToolRunning),
        ("PostToolUse", None, Phase::ToolRunning),
        ("PostToolUse", None, Phase::Thinking),
        ("Notification", None, Phase::Thinking),
        ("PreCompact", None, Phase::Thinking),
        ("Stop", None, Phase::Idle),
        ("SessionEnd", None, Phase::Inactive),
    ];

    for (tag, tool, expected) in steps {
        machine.process_event(tag, None, *tool);
        assert_eq!(machine.phase(), *expected, "after {}", tag);
    }
    assert_eq!(machine.context().tool_name, None);
}
