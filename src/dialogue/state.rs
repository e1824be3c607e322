//! Conversation state machine: tracks which prompt a user is answering.

use crate::store::fields;

/// One of the three worksheet benefit answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenefitSlot {
    First,
    Second,
    Third,
}

impl BenefitSlot {
    pub const ALL: [BenefitSlot; 3] = [Self::First, Self::Second, Self::Third];

    /// 1-based position shown to the user.
    pub fn number(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    /// Parse the user's "1" / "2" / "3" reply.
    pub fn from_choice(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::First),
            "2" => Some(Self::Second),
            "3" => Some(Self::Third),
            _ => None,
        }
    }

    /// Record field holding this answer.
    pub fn field(&self) -> &'static str {
        match self {
            Self::First => fields::LAB1_BENEFIT1,
            Self::Second => fields::LAB1_BENEFIT2,
            Self::Third => fields::LAB1_BENEFIT3,
        }
    }

    pub fn next(&self) -> Option<BenefitSlot> {
        match self {
            Self::First => Some(Self::Second),
            Self::Second => Some(Self::Third),
            Self::Third => None,
        }
    }
}

/// Whether a benefit answer is part of the first pass or a single correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Walk 1 → 2 → 3 → confirm.
    Collect,
    /// Overwrite one answer, then straight back to confirm.
    Edit,
}

/// Where a user is in the conversation.
///
/// Onboarding: Idle → AskName → AskFaculty → AskGroup → MenuReady.
/// Worksheet: LabMenu → ObjectPrompt → Benefit 1..3 → ConfirmPrompt →
/// {MenuReady | ChangeFieldPrompt → Benefit k (edit) | Benefit 1 (collect)}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AskName,
    AskFaculty,
    AskGroup,
    MenuReady,
    AskQuestion,
    LabMenu,
    ObjectPrompt,
    Benefit {
        slot: BenefitSlot,
        mode: EntryMode,
    },
    ConfirmPrompt,
    ChangeFieldPrompt,
}

impl ConversationState {
    /// First benefit prompt of a fresh pass.
    pub const fn first_benefit() -> Self {
        Self::Benefit {
            slot: BenefitSlot::First,
            mode: EntryMode::Collect,
        }
    }

    /// Check if a transition from `self` to `target` is valid.
    ///
    /// `/start` may move any state to AskName or MenuReady.
    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        use ConversationState::*;
        match (*self, target) {
            (_, AskName) | (_, MenuReady) => true,
            (AskName, AskFaculty) | (AskFaculty, AskGroup) => true,
            (MenuReady | LabMenu, AskQuestion) | (MenuReady | LabMenu, LabMenu) => true,
            (LabMenu, ObjectPrompt) => true,
            (ObjectPrompt, Benefit { slot, mode }) => {
                slot == BenefitSlot::First && mode == EntryMode::Collect
            }
            (
                Benefit {
                    slot: from,
                    mode: EntryMode::Collect,
                },
                Benefit {
                    slot: to,
                    mode: EntryMode::Collect,
                },
            ) => from.next() == Some(to),
            (
                Benefit {
                    slot: BenefitSlot::Third,
                    mode: EntryMode::Collect,
                },
                ConfirmPrompt,
            ) => true,
            (
                Benefit {
                    mode: EntryMode::Edit,
                    ..
                },
                ConfirmPrompt,
            ) => true,
            (ConfirmPrompt, ChangeFieldPrompt) => true,
            (ConfirmPrompt, Benefit { slot, mode }) => {
                slot == BenefitSlot::First && mode == EntryMode::Collect
            }
            (ChangeFieldPrompt, ChangeFieldPrompt) => true,
            (ChangeFieldPrompt, Benefit { mode, .. }) => mode == EntryMode::Edit,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AskName => write!(f, "ask_name"),
            Self::AskFaculty => write!(f, "ask_faculty"),
            Self::AskGroup => write!(f, "ask_group"),
            Self::MenuReady => write!(f, "menu_ready"),
            Self::AskQuestion => write!(f, "ask_question"),
            Self::LabMenu => write!(f, "lab_menu"),
            Self::ObjectPrompt => write!(f, "object_prompt"),
            Self::Benefit { slot, mode } => match mode {
                EntryMode::Collect => write!(f, "benefit{}", slot.number()),
                EntryMode::Edit => write!(f, "benefit{}_edit", slot.number()),
            },
            Self::ConfirmPrompt => write!(f, "confirm_prompt"),
            Self::ChangeFieldPrompt => write!(f, "change_field_prompt"),
        }
    }
}
