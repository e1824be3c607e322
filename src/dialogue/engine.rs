//! DialogueEngine: the single transition function of the conversation.
//!
//! `transition` is pure: given the current state, the event and the user's
//! record it decides the next state, the record patch and the messages to
//! send. It never touches the store or the network.

use std::path::PathBuf;
use std::time::Duration;

use crate::channels::{OutgoingMessage, PhotoSource};
use crate::store::{RecordPatch, UserRecord, fields};

use super::event::{Effect, Event, Transition};
use super::prompts;
use super::state::{BenefitSlot, ConversationState, EntryMode};
use super::validate::validate_name;

/// Drives the onboarding and worksheet conversation.
#[derive(Debug, Clone)]
pub struct DialogueEngine {
    greeting_photo: Option<PathBuf>,
    message_delay: Duration,
}

impl DialogueEngine {
    pub fn new(greeting_photo: Option<PathBuf>, message_delay: Duration) -> Self {
        Self {
            greeting_photo,
            message_delay,
        }
    }

    /// State for a user with no session yet.
    pub fn initial_state(record: &UserRecord) -> ConversationState {
        if record.is_onboarded() {
            ConversationState::MenuReady
        } else {
            ConversationState::Idle
        }
    }

    /// Handle `event` in `state`.
    ///
    /// `None` means no handler is wired for this pair: the event is dropped
    /// without a reply and the state stays as it is.
    pub fn transition(
        &self,
        state: ConversationState,
        event: &Event,
        record: &UserRecord,
    ) -> Option<Transition> {
        let transition = match event {
            Event::Start => Some(self.on_start(record)),
            Event::Text(text) => self.on_text(state, text, record),
            Event::Callback { data, message_id } => self.on_callback(state, data, *message_id),
            Event::Notify | Event::Command(_) | Event::Photo { .. } => None,
        }?;

        debug_assert!(
            state.can_transition_to(transition.next),
            "invalid transition {state} -> {}",
            transition.next
        );
        Some(transition)
    }

    fn on_start(&self, record: &UserRecord) -> Transition {
        if record.is_onboarded() {
            return with_main_menu(Transition::to(ConversationState::MenuReady));
        }

        let greeting = match &self.greeting_photo {
            Some(path) => Effect::Send(OutgoingMessage::Photo {
                photo: PhotoSource::Path(path.clone()),
                caption: Some(prompts::GREETING.to_string()),
            }),
            None => Effect::text(prompts::GREETING),
        };

        Transition::to(ConversationState::AskName)
            .with_effect(greeting)
            .with_patch(RecordPatch::empty())
    }

    fn on_text(
        &self,
        state: ConversationState,
        text: &str,
        record: &UserRecord,
    ) -> Option<Transition> {
        use ConversationState::*;

        let transition = match state {
            AskName if validate_name(text) => Transition::to(AskFaculty)
                .with_patch(RecordPatch::set(fields::NAME, text))
                .with_effect(Effect::text(prompts::ASK_FACULTY)),
            AskName => Transition::to(AskName).with_effect(Effect::text(prompts::NAME_INVALID)),

            AskFaculty => Transition::to(AskGroup)
                .with_patch(RecordPatch::set(fields::FACULTY, text))
                .with_effect(Effect::text(prompts::ASK_GROUP)),

            AskGroup => with_main_menu(
                Transition::to(MenuReady).with_patch(RecordPatch::set(fields::GROUP, text)),
            ),

            MenuReady | LabMenu if text == prompts::BUTTON_ASK_QUESTION => {
                Transition::to(AskQuestion).with_effect(Effect::text(prompts::ASK_QUESTION))
            }
            MenuReady | LabMenu if text == prompts::BUTTON_LAB_HELP => Transition::to(LabMenu)
                .with_effect(Effect::text(prompts::LAB_WELCOME))
                .with_effect(Effect::text(prompts::LAB_OVERVIEW))
                .with_effect(Effect::Send(OutgoingMessage::with_keyboard(
                    prompts::LAB_CHOOSE,
                    prompts::lab_menu(),
                ))),

            AskQuestion => {
                let t = Transition::to(MenuReady).with_effect(Effect::text(prompts::SEARCH_UNAVAILABLE));
                with_menu_keyboard(t)
            }

            ObjectPrompt => Transition::to(ConversationState::first_benefit())
                .with_patch(RecordPatch::set(fields::LAB1_OBJECT, text))
                .with_effect(Effect::text(prompts::benefit_prompt(BenefitSlot::First))),

            Benefit { slot, mode } => {
                let patch = RecordPatch::set(slot.field(), text);
                match (mode, slot.next()) {
                    (EntryMode::Collect, Some(next)) => Transition::to(Benefit {
                        slot: next,
                        mode: EntryMode::Collect,
                    })
                    .with_patch(patch)
                    .with_effect(Effect::text(prompts::benefit_prompt(next))),
                    _ => {
                        // Summary reads the answer just given.
                        let mut updated = record.clone();
                        updated.apply(&patch);
                        Transition::to(ConfirmPrompt)
                            .with_patch(patch)
                            .with_effect(confirm_summary(&updated))
                    }
                }
            }

            ChangeFieldPrompt => match BenefitSlot::from_choice(text) {
                Some(slot) => Transition::to(Benefit {
                    slot,
                    mode: EntryMode::Edit,
                })
                .with_effect(Effect::text(prompts::benefit_edit_prompt(slot))),
                None => Transition::to(ChangeFieldPrompt)
                    .with_effect(Effect::text(prompts::CHANGE_INVALID)),
            },

            Idle | MenuReady | LabMenu | ConfirmPrompt => return None,
        };

        Some(transition)
    }

    fn on_callback(
        &self,
        state: ConversationState,
        data: &str,
        message_id: i64,
    ) -> Option<Transition> {
        use ConversationState::*;

        match state {
            LabMenu => {
                let (_, label) = prompts::LAB_BUTTONS.iter().find(|(d, _)| *d == data)?;
                let selected = Effect::Send(OutgoingMessage::EditText {
                    message_id,
                    text: prompts::lab_selected(label),
                });

                if data == "lab1" {
                    Some(self.lab1_intro(Transition::to(ObjectPrompt).with_effect(selected)))
                } else {
                    // Labs 2 and 3 have no worksheet yet.
                    Some(with_menu_keyboard(Transition::to(MenuReady).with_effect(selected)))
                }
            }
            ConfirmPrompt => match data {
                prompts::CONFIRM_YES => Some(with_main_menu(
                    Transition::to(MenuReady).with_effect(Effect::text(prompts::CONFIRM_SAVED)),
                )),
                prompts::CONFIRM_NO => Some(
                    Transition::to(ChangeFieldPrompt)
                        .with_effect(Effect::text(prompts::CHANGE_WHICH)),
                ),
                // Re-collects all three answers over the same fields.
                prompts::CONFIRM_ADD => Some(
                    Transition::to(ConversationState::first_benefit())
                        .with_effect(Effect::text(prompts::benefit_prompt(BenefitSlot::First))),
                ),
                _ => None,
            },
            _ => None,
        }
    }

    /// Typing indicator, pause, line, repeated; then the first question.
    fn lab1_intro(&self, mut transition: Transition) -> Transition {
        for line in prompts::LAB1_INTRO
            .iter()
            .copied()
            .chain(std::iter::once(prompts::LAB1_ASK_OBJECT))
        {
            transition = transition
                .with_effect(Effect::Send(OutgoingMessage::Typing))
                .with_effect(Effect::Pause(self.message_delay))
                .with_effect(Effect::text(line));
        }
        transition
    }
}

/// "How can I help" followed by the menu keyboard.
fn with_main_menu(transition: Transition) -> Transition {
    with_menu_keyboard(transition.with_effect(Effect::text(prompts::HOW_CAN_I_HELP)))
}

fn with_menu_keyboard(transition: Transition) -> Transition {
    transition.with_effect(Effect::Send(OutgoingMessage::with_keyboard(
        prompts::CHOOSE_ACTION,
        prompts::main_menu(),
    )))
}

fn confirm_summary(record: &UserRecord) -> Effect {
    Effect::Send(OutgoingMessage::with_keyboard(
        prompts::benefit_summary(record),
        prompts::confirm_menu(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Keyboard;

    fn engine() -> DialogueEngine {
        DialogueEngine::new(None, Duration::ZERO)
    }

    fn text(s: &str) -> Event {
        Event::Text(s.to_string())
    }

    fn press(data: &str) -> Event {
        Event::Callback {
            data: data.to_string(),
            message_id: 42,
        }
    }

    /// Run events from `state`, folding patches into `record` like the
    /// dispatcher does.
    fn drive(
        engine: &DialogueEngine,
        mut state: ConversationState,
        record: &mut UserRecord,
        events: &[Event],
    ) -> ConversationState {
        for event in events {
            let t = engine
                .transition(state, event, record)
                .unwrap_or_else(|| panic!("no handler for {event:?} in {state}"));
            if let Some(patch) = &t.patch {
                record.apply(patch);
            }
            state = t.next;
        }
        state
    }

    fn onboarded() -> UserRecord {
        [
            (fields::NAME, "Иванов Иван Иванович"),
            (fields::FACULTY, "ФЭТ"),
            (fields::GROUP, "G4150"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn start_for_new_user_asks_name_and_creates_record() {
        let t = engine()
            .transition(ConversationState::Idle, &Event::Start, &UserRecord::new())
            .unwrap();
        assert_eq!(t.next, ConversationState::AskName);
        assert_eq!(t.patch, Some(RecordPatch::empty()));
        assert_eq!(t.texts(), vec![prompts::GREETING]);
    }

    #[test]
    fn start_greets_with_photo_when_configured() {
        let engine = DialogueEngine::new(Some(PathBuf::from("ekolina.jpg")), Duration::ZERO);
        let t = engine
            .transition(ConversationState::Idle, &Event::Start, &UserRecord::new())
            .unwrap();
        assert_eq!(
            t.effects,
            vec![Effect::Send(OutgoingMessage::Photo {
                photo: PhotoSource::Path(PathBuf::from("ekolina.jpg")),
                caption: Some(prompts::GREETING.to_string()),
            })]
        );
    }

    #[test]
    fn onboarding_collects_identity_fields() {
        let engine = engine();
        let mut record = UserRecord::new();
        let state = drive(
            &engine,
            ConversationState::Idle,
            &mut record,
            &[
                Event::Start,
                text("Иванов Иван Иванович"),
                text("Факультет экотехнологий"),
                text("G4150"),
            ],
        );

        assert_eq!(state, ConversationState::MenuReady);
        assert_eq!(record.len(), 3);
        assert_eq!(record.get(fields::NAME), Some("Иванов Иван Иванович"));
        assert_eq!(record.get(fields::FACULTY), Some("Факультет экотехнологий"));
        assert_eq!(record.get(fields::GROUP), Some("G4150"));
    }

    #[test]
    fn invalid_name_repeats_prompt_without_patch() {
        let t = engine()
            .transition(ConversationState::AskName, &text("иван"), &UserRecord::new())
            .unwrap();
        assert_eq!(t.next, ConversationState::AskName);
        assert!(t.patch.is_none());
        assert_eq!(t.texts(), vec![prompts::NAME_INVALID]);
    }

    #[test]
    fn returning_user_start_short_circuits_to_menu() {
        let engine = engine();
        let record = onboarded();
        for state in [
            ConversationState::Idle,
            ConversationState::MenuReady,
            ConversationState::ConfirmPrompt,
        ] {
            let t = engine.transition(state, &Event::Start, &record).unwrap();
            assert_eq!(t.next, ConversationState::MenuReady);
            assert!(t.patch.is_none());
            assert_eq!(t.texts(), vec![prompts::HOW_CAN_I_HELP, prompts::CHOOSE_ACTION]);
        }
    }

    #[test]
    fn initial_state_depends_on_onboarding() {
        assert_eq!(DialogueEngine::initial_state(&UserRecord::new()), ConversationState::Idle);
        assert_eq!(DialogueEngine::initial_state(&onboarded()), ConversationState::MenuReady);
    }

    #[test]
    fn question_is_always_unavailable() {
        let engine = engine();
        let mut record = onboarded();
        let state = drive(
            &engine,
            ConversationState::MenuReady,
            &mut record,
            &[text(prompts::BUTTON_ASK_QUESTION)],
        );
        assert_eq!(state, ConversationState::AskQuestion);

        let t = engine.transition(state, &text("Что такое экология?"), &record).unwrap();
        assert_eq!(t.next, ConversationState::MenuReady);
        assert_eq!(t.texts()[0], prompts::SEARCH_UNAVAILABLE);
        assert!(t.patch.is_none());
    }

    #[test]
    fn lab_menu_offers_three_labs() {
        let t = engine()
            .transition(ConversationState::MenuReady, &text(prompts::BUTTON_LAB_HELP), &onboarded())
            .unwrap();
        assert_eq!(t.next, ConversationState::LabMenu);
        let last = t.effects.last().unwrap();
        assert_eq!(
            last,
            &Effect::Send(OutgoingMessage::with_keyboard(prompts::LAB_CHOOSE, prompts::lab_menu()))
        );
    }

    #[test]
    fn lab1_runs_scripted_intro() {
        let engine = DialogueEngine::new(None, Duration::from_millis(250));
        let t = engine
            .transition(ConversationState::LabMenu, &press("lab1"), &onboarded())
            .unwrap();

        assert_eq!(t.next, ConversationState::ObjectPrompt);
        assert_eq!(
            t.effects[0],
            Effect::Send(OutgoingMessage::EditText {
                message_id: 42,
                text: "Вы выбрали Лабораторная работа №1.".into()
            })
        );
        let pauses = t
            .effects
            .iter()
            .filter(|e| **e == Effect::Pause(Duration::from_millis(250)))
            .count();
        assert_eq!(pauses, prompts::LAB1_INTRO.len() + 1);
        assert_eq!(t.texts().last(), Some(&prompts::LAB1_ASK_OBJECT));
    }

    #[test]
    fn lab2_and_lab3_return_to_menu() {
        for lab in ["lab2", "lab3"] {
            let t = engine()
                .transition(ConversationState::LabMenu, &press(lab), &onboarded())
                .unwrap();
            assert_eq!(t.next, ConversationState::MenuReady);
            assert!(t.patch.is_none());
        }
    }

    #[test]
    fn worksheet_confirm_yes_keeps_answers() {
        let engine = engine();
        let mut record = onboarded();
        let state = drive(
            &engine,
            ConversationState::LabMenu,
            &mut record,
            &[
                press("lab1"),
                text("Городской парк"),
                text("A"),
                text("B"),
                text("C"),
            ],
        );
        assert_eq!(state, ConversationState::ConfirmPrompt);

        let state = drive(&engine, state, &mut record, &[press(prompts::CONFIRM_YES)]);
        assert_eq!(state, ConversationState::MenuReady);
        assert_eq!(record.get(fields::LAB1_OBJECT), Some("Городской парк"));
        assert_eq!(record.get(fields::LAB1_BENEFIT1), Some("A"));
        assert_eq!(record.get(fields::LAB1_BENEFIT2), Some("B"));
        assert_eq!(record.get(fields::LAB1_BENEFIT3), Some("C"));
    }

    #[test]
    fn confirm_summary_includes_last_answer() {
        let engine = engine();
        let mut record = onboarded();
        record.set(fields::LAB1_BENEFIT1, "A");
        record.set(fields::LAB1_BENEFIT2, "B");

        let third = ConversationState::Benefit {
            slot: BenefitSlot::Third,
            mode: EntryMode::Collect,
        };
        let t = engine.transition(third, &text("C"), &record).unwrap();
        assert_eq!(t.next, ConversationState::ConfirmPrompt);

        let Effect::Send(OutgoingMessage::Text { text, keyboard }) = &t.effects[0] else {
            panic!("expected summary text");
        };
        assert!(text.contains("3. C"));
        assert_eq!(keyboard.as_ref(), Some(&prompts::confirm_menu()));
    }

    #[test]
    fn change_field_overwrites_only_chosen_benefit() {
        let engine = engine();
        let mut record = onboarded();
        let state = drive(
            &engine,
            ConversationState::ObjectPrompt,
            &mut record,
            &[
                text("Река"),
                text("A"),
                text("B"),
                text("C"),
                press(prompts::CONFIRM_NO),
            ],
        );
        assert_eq!(state, ConversationState::ChangeFieldPrompt);

        let state = drive(&engine, state, &mut record, &[text("2")]);
        assert_eq!(
            state,
            ConversationState::Benefit {
                slot: BenefitSlot::Second,
                mode: EntryMode::Edit
            }
        );

        let state = drive(&engine, state, &mut record, &[text("B2")]);
        assert_eq!(state, ConversationState::ConfirmPrompt);
        assert_eq!(record.get(fields::LAB1_BENEFIT1), Some("A"));
        assert_eq!(record.get(fields::LAB1_BENEFIT2), Some("B2"));
        assert_eq!(record.get(fields::LAB1_BENEFIT3), Some("C"));
    }

    #[test]
    fn change_field_rejects_other_input() {
        let t = engine()
            .transition(ConversationState::ChangeFieldPrompt, &text("4"), &onboarded())
            .unwrap();
        assert_eq!(t.next, ConversationState::ChangeFieldPrompt);
        assert_eq!(t.texts(), vec![prompts::CHANGE_INVALID]);
    }

    #[test]
    fn add_point_recollects_over_same_fields() {
        let engine = engine();
        let mut record = onboarded();
        let state = drive(
            &engine,
            ConversationState::ObjectPrompt,
            &mut record,
            &[
                text("Лес"),
                text("A"),
                text("B"),
                text("C"),
                press(prompts::CONFIRM_ADD),
            ],
        );
        assert_eq!(state, ConversationState::first_benefit());

        let state = drive(&engine, state, &mut record, &[text("D"), text("E"), text("F")]);
        assert_eq!(state, ConversationState::ConfirmPrompt);
        assert_eq!(record.get(fields::LAB1_BENEFIT1), Some("D"));
        assert_eq!(record.get(fields::LAB1_BENEFIT3), Some("F"));
        assert!(record.get("lab1_benefit4").is_none());
    }

    #[test]
    fn unmatched_events_are_dropped() {
        let engine = engine();
        let record = onboarded();
        let cases = [
            (ConversationState::Idle, text("hello")),
            (ConversationState::MenuReady, text("просто текст")),
            (ConversationState::LabMenu, press("lab9")),
            (ConversationState::ConfirmPrompt, text("да")),
            (ConversationState::ConfirmPrompt, press("lab1")),
            (ConversationState::AskName, press(prompts::CONFIRM_YES)),
            (ConversationState::AskFaculty, Event::Notify),
            (ConversationState::MenuReady, Event::Command("help".into())),
            (
                ConversationState::AskQuestion,
                Event::Photo {
                    file_id: "f".into(),
                    caption: None,
                },
            ),
        ];
        for (state, event) in cases {
            assert!(
                engine.transition(state, &event, &record).is_none(),
                "{event:?} in {state} should be dropped"
            );
        }
    }

    #[test]
    fn menu_buttons_work_while_lab_menu_is_open() {
        let t = engine()
            .transition(ConversationState::LabMenu, &text(prompts::BUTTON_ASK_QUESTION), &onboarded())
            .unwrap();
        assert_eq!(t.next, ConversationState::AskQuestion);
    }

    #[test]
    fn free_text_fields_are_not_validated() {
        let engine = engine();
        for input in ["", "123", "x", "!!!"] {
            let t = engine
                .transition(ConversationState::AskFaculty, &text(input), &UserRecord::new())
                .unwrap();
            assert_eq!(t.next, ConversationState::AskGroup);
            assert_eq!(t.patch, Some(RecordPatch::set(fields::FACULTY, input)));
        }
    }

    #[test]
    fn main_menu_keyboard_is_reply_keyboard() {
        let t = engine()
            .transition(ConversationState::AskGroup, &text("G1"), &UserRecord::new())
            .unwrap();
        let Some(Effect::Send(OutgoingMessage::Text { keyboard, .. })) = t.effects.last() else {
            panic!("expected menu message");
        };
        assert!(matches!(keyboard, Some(Keyboard::Reply(_))));
    }
}
