//! Property-based tests for the state machine
//!
//! These tests drive whole conversations through the pure transition function
//! and apply the resulting effects to in-memory histories and a transcript.

use super::transition::*;
use super::*;
use crate::history::{HistoryPair, Speaker, Transcript};
use crate::llm::LlmErrorKind;
use crate::persona::{ModelChoice, PersonaPair, Side};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context(max_turns: u32, use_context: bool) -> ConvContext {
    let model = |alias: &str| {
        Some(ModelChoice {
            alias: alias.to_string(),
            backend_model_id: format!("{}:latest", alias.to_lowercase()),
        })
    };
    ConvContext::new(
        PersonaPair::new(model("Phi 3"), model("Qwen 2.5")),
        max_turns,
        use_context,
    )
}

/// A conversation driven purely by transitions
struct Sim {
    ctx: ConvContext,
    state: ConvState,
    histories: HistoryPair,
    transcript: Transcript,
    /// Speaker and turn of the outstanding backend call
    in_flight: Option<(Side, u32)>,
    requests: Vec<(Side, String, u32)>,
}

impl Sim {
    fn new(ctx: ConvContext) -> Self {
        Self {
            ctx,
            state: ConvState::Idle,
            histories: HistoryPair::default(),
            transcript: Transcript::default(),
            in_flight: None,
            requests: Vec::new(),
        }
    }

    fn step(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        let answers_in_flight = matches!(
            (&event, self.in_flight),
            (Event::ReplyComplete { speaker, .. } | Event::ReplyFailed { speaker, .. }, Some((s, _)))
                if *speaker == s
        );
        let result = transition(&self.state, &self.ctx, event)?;
        if answers_in_flight {
            self.in_flight = None;
        }
        self.state = result.new_state;
        for effect in &result.effects {
            self.apply(effect);
        }
        Ok(result.effects)
    }

    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::SeedHistory { side, prompt } => self.histories.get_mut(*side).push_user(prompt),
            Effect::RequestReply {
                speaker,
                input,
                turn,
            } => {
                assert!(
                    self.in_flight.is_none(),
                    "second request while {:?} is in flight",
                    self.in_flight
                );
                self.in_flight = Some((*speaker, *turn));
                self.requests.push((*speaker, input.clone(), *turn));
            }
            Effect::AppendReply { speaker, reply } => {
                self.transcript.push_reply(*speaker, reply.clone());
            }
            Effect::RecordHistory { speaker, reply } => self.histories.record_reply(*speaker, reply),
            Effect::AppendNote { text } => {
                self.transcript.push_note(text.clone());
            }
            Effect::ClearConversation => {
                self.histories.clear();
                self.transcript.clear();
            }
            Effect::ReplacePersona { persona } => self.ctx.personas.set(persona.clone()),
            Effect::ReplaceOptions {
                max_turns,
                use_context,
            } => {
                self.ctx.max_turns = *max_turns;
                self.ctx.use_context = *use_context;
            }
            Effect::WriteSessionLog { .. } | Effect::NotifyStateChange => {}
        }
    }

    /// Answer the outstanding request, if any
    fn answer(&mut self, text: &str) -> Option<Result<Vec<Effect>, TransitionError>> {
        let (speaker, turn) = self.in_flight?;
        Some(self.step(Event::reply(speaker, format!("{text} #{turn}"))))
    }

    fn reply_count(&self, side: Side) -> usize {
        self.transcript
            .replies()
            .filter(|e| e.speaker == Speaker::from(side))
            .count()
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Left), Just(Side::Right)]
}

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Unavailable),
        Just(LlmErrorKind::Backend),
        Just(LlmErrorKind::Timeout),
        Just(LlmErrorKind::Malformed),
    ]
}

/// Something that can happen while a conversation is running
#[derive(Debug, Clone)]
enum Action {
    Answer(String),
    Cancel,
    Fail(LlmErrorKind),
    Reset,
    Ask(String, String),
    StrayReply(Side),
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        8 => "[a-zA-Z ]{1,20}".prop_map(Action::Answer),
        1 => Just(Action::Cancel),
        1 => arb_error_kind().prop_map(Action::Fail),
        1 => Just(Action::Reset),
        1 => ("[a-z ]{0,5}", "[a-z ]{0,5}").prop_map(|(l, r)| Action::Ask(l, r)),
        1 => arb_side().prop_map(Action::StrayReply),
    ]
}

fn arb_terminal_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        (1u32..10).prop_map(|replies| ConvState::Completed { replies }),
        (1u32..10).prop_map(|replies| ConvState::Stopped { replies }),
        ("[a-zA-Z ]{1,30}", arb_error_kind())
            .prop_map(|(message, error_kind)| ConvState::Failed { message, error_kind }),
    ]
}

fn arb_running_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        (arb_side(), any::<bool>()).prop_map(|(asked, stop_requested)| {
            ConvState::AwaitingFirstReply {
                asked,
                stop_requested,
            }
        }),
        (1u32..10, arb_side(), any::<bool>()).prop_map(|(turn, speaker, stop_requested)| {
            ConvState::InProgress {
                turn,
                speaker,
                stop_requested,
            }
        }),
    ]
}

fn run_actions(sim: &mut Sim, actions: Vec<Action>) {
    for action in actions {
        let _ = match action {
            Action::Answer(text) => sim.answer(&text).unwrap_or(Ok(vec![])),
            Action::Cancel => sim.step(Event::Cancel),
            Action::Fail(error_kind) => match sim.in_flight {
                Some((speaker, _)) => sim.step(Event::ReplyFailed {
                    speaker,
                    message: "backend went away".to_string(),
                    error_kind,
                }),
                None => Ok(vec![]),
            },
            Action::Reset => sim.step(Event::Reset),
            Action::Ask(left, right) => sim.step(Event::ask(left, right)),
            Action::StrayReply(side) => sim.step(Event::reply(side, "stray")),
        };
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // A conversation left alone records the opening reply plus max_turns more
    #[test]
    fn prop_completed_has_max_turns_plus_one_replies(
        max_turns in 0u32..8,
        use_context in any::<bool>(),
        asked in arb_side(),
    ) {
        let mut sim = Sim::new(test_context(max_turns, use_context));
        let (left, right) = match asked {
            Side::Left => ("Why is the sky blue?", ""),
            Side::Right => ("", "Why is the sky blue?"),
        };
        sim.step(Event::ask(left, right)).unwrap();

        while let Some(result) = sim.answer("reply") {
            result.unwrap();
        }

        prop_assert_eq!(&sim.state, &ConvState::Completed { replies: max_turns + 1 });
        prop_assert_eq!(sim.transcript.reply_count(), max_turns as usize + 1);
        prop_assert_eq!(sim.requests.len(), max_turns as usize + 1);
        prop_assert_eq!(sim.requests[0].0, asked);
    }

    // Consecutive persona replies never share a speaker
    #[test]
    fn prop_speakers_alternate(
        max_turns in 0u32..8,
        use_context in any::<bool>(),
        actions in proptest::collection::vec(arb_action(), 0..30),
    ) {
        let mut sim = Sim::new(test_context(max_turns, use_context));
        sim.step(Event::ask("", "start")).unwrap();
        run_actions(&mut sim, actions);

        let speakers: Vec<Speaker> = sim.transcript.replies().map(|e| e.speaker).collect();
        for pair in speakers.windows(2) {
            prop_assert_ne!(pair[0], pair[1]);
        }
    }

    // The asserting Sim::apply rejects a second request while one is in flight;
    // this property also checks running states always have one outstanding
    #[test]
    fn prop_single_request_in_flight(
        max_turns in 0u32..8,
        actions in proptest::collection::vec(arb_action(), 0..30),
    ) {
        let mut sim = Sim::new(test_context(max_turns, true));
        sim.step(Event::ask("start", "")).unwrap();
        for action in actions {
            run_actions(&mut sim, vec![action]);
            prop_assert_eq!(sim.state.is_running(), sim.in_flight.is_some());
            if let Some((speaker, turn)) = sim.in_flight {
                prop_assert_eq!(sim.state.speaker(), Some(speaker));
                prop_assert_eq!(sim.state.current_turn(), Some(turn));
            }
        }
    }

    // With context, personas that spoke equally often see equally long contexts
    #[test]
    fn prop_equal_context_when_equal_replies(
        max_turns in 0u32..10,
        answers in 1usize..12,
    ) {
        let mut sim = Sim::new(test_context(max_turns, true));
        sim.step(Event::ask("Why is the sky blue?", "")).unwrap();

        for _ in 0..answers {
            if sim.answer("reply").is_none() {
                break;
            }
            if sim.reply_count(Side::Left) == sim.reply_count(Side::Right) {
                prop_assert_eq!(
                    sim.histories.left.context().len(),
                    sim.histories.right.context().len()
                );
            }
            prop_assert_eq!(sim.histories.left.context().len() % 2, 0);
            prop_assert_eq!(sim.histories.right.context().len() % 2, 0);
        }
    }

    // Without context no history is ever built
    #[test]
    fn prop_no_history_without_context(
        max_turns in 0u32..8,
        actions in proptest::collection::vec(arb_action(), 0..30),
    ) {
        let mut sim = Sim::new(test_context(max_turns, false));
        sim.step(Event::ask("start", "")).unwrap();
        run_actions(&mut sim, actions);
        prop_assert!(sim.histories.left.messages().is_empty());
        prop_assert!(sim.histories.right.messages().is_empty());
    }

    // Blank input slots leave everything untouched
    #[test]
    fn prop_blank_input_stays_idle(left in "[ \t\n]{0,5}", right in "[ \t\n]{0,5}") {
        let result = transition(&ConvState::Idle, &test_context(4, true), Event::ask(left, right)).unwrap();
        prop_assert_eq!(result.new_state, ConvState::Idle);
        prop_assert!(result.effects.is_empty());
    }

    // Finished conversations need a reset before the next ask
    #[test]
    fn prop_terminal_rejects_ask(state in arb_terminal_state(), text in "[a-z]{1,10}") {
        let result = transition(&state, &test_context(4, true), Event::ask(text, ""));
        prop_assert_eq!(result.unwrap_err(), TransitionError::ResetRequired);
    }

    // Running conversations refuse resets and persona changes
    #[test]
    fn prop_running_rejects_changes(state in arb_running_state(), side in arb_side()) {
        let ctx = test_context(4, true);
        prop_assert_eq!(
            transition(&state, &ctx, Event::Reset).unwrap_err(),
            TransitionError::ConversationActive
        );
        let persona = ctx.personas.get(side).clone();
        prop_assert_eq!(
            transition(&state, &ctx, Event::ConfigurePersona { update: persona.into() }).unwrap_err(),
            TransitionError::ConversationActive
        );
    }

    // A failure keeps every recorded reply and adds one system note
    #[test]
    fn prop_failure_preserves_transcript(
        max_turns in 1u32..8,
        answers in 0usize..8,
        kind in arb_error_kind(),
    ) {
        let mut sim = Sim::new(test_context(max_turns, true));
        sim.step(Event::ask("", "start")).unwrap();
        for _ in 0..answers.min(max_turns as usize) {
            sim.answer("reply").unwrap().unwrap();
        }
        let before = sim.transcript.clone();
        let histories_before = sim.histories.clone();
        let (speaker, _) = sim.in_flight.unwrap();

        sim.step(Event::ReplyFailed {
            speaker,
            message: "timed out".to_string(),
            error_kind: kind,
        }).unwrap();

        let is_failed = matches!(sim.state, ConvState::Failed { .. });
        prop_assert!(is_failed);
        prop_assert_eq!(&sim.transcript.entries()[..before.entries().len()], before.entries());
        prop_assert_eq!(sim.transcript.entries().len(), before.entries().len() + 1);
        prop_assert_eq!(sim.histories, histories_before);
        prop_assert!(sim.in_flight.is_none());
    }

    // Cancel takes effect only after the in-flight reply is recorded
    #[test]
    fn prop_cancel_finishes_current_reply(max_turns in 1u32..8, answers in 0usize..8) {
        let mut sim = Sim::new(test_context(max_turns, true));
        sim.step(Event::ask("start", "")).unwrap();
        for _ in 0..answers.min(max_turns as usize - 1) {
            sim.answer("reply").unwrap().unwrap();
        }
        let replies_before = sim.transcript.reply_count();

        sim.step(Event::Cancel).unwrap();
        prop_assert!(sim.state.is_running());
        sim.answer("last").unwrap().unwrap();

        let replies = u32::try_from(replies_before + 1).unwrap();
        prop_assert_eq!(&sim.state, &ConvState::Stopped { replies });
        prop_assert_eq!(sim.transcript.reply_count(), replies_before + 1);
        prop_assert!(sim.in_flight.is_none());
    }
}
