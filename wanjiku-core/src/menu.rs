//! USSD menu tree: screen texts, the service catalogue and the input
//! transition table consulted by the session flow engine.
//!
//! Dispatch does not depend on the caller's current step: every row of
//! [`TRANSITIONS`] applies in any state, and the first matching row wins.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Shown whenever a request cannot be served.
pub const APOLOGY: &str = "Samahani, kuna tatizo. Tafadhali jaribu tena.";

/// Appended to free-text replies cut to fit one screen.
pub const ELLIPSIS: &str = "...";

/// Name used on the detail screen for an unknown `1.x` code.
pub const GENERIC_SERVICE: &str = "Huduma";

/// Codes reachable from the services menu.
pub const SERVICE_CATALOGUE: [(&str, &str); 5] = [
    ("1.1", "Cheti cha Kuzaliwa"),
    ("1.2", "Kitambulisho cha Taifa"),
    ("1.3", "Leseni ya Biashara"),
    ("1.4", "Leseni ya Kuendesha"),
    ("1.5", "Pasipoti"),
];

const DOCUMENT_OPTIONS: [(&str, &str); 4] = [
    ("2.1", "Thibitisha Hati"),
    ("2.2", "Pakia Hati"),
    ("2.3", "Angalia Hati"),
    ("2.4", "Historia ya Hati"),
];

const WELCOME_OPTIONS: [(&str, &str); 4] = [
    ("1", "Huduma za Serikali"),
    ("2", "Hati za Kidijitali"),
    ("3", "Msaada"),
    ("0", "Ondoka"),
];

const WELCOME_TEXT: &str = "Karibu Wanjiku 2.0!
Msaidizi wa Serikali wa Kenya

Chagua:
1. Huduma za Serikali
2. Hati za Kidijitali
3. Msaada

0. Ondoka";

const SERVICES_TEXT: &str = "Huduma za Serikali:

1.1 Cheti cha Kuzaliwa
1.2 Kitambulisho cha Taifa
1.3 Leseni ya Biashara
1.4 Leseni ya Kuendesha
1.5 Pasipoti

0. Rudi";

const DOCUMENTS_TEXT: &str = "Hati za Kidijitali:

2.1 Thibitisha Hati
2.2 Pakia Hati
2.3 Angalia Hati
2.4 Historia ya Hati

0. Rudi";

const HELP_TEXT: &str = "Msaada:

Wanjiku 2.0 ni msaidizi wako wa serikali.
Anaweza kukusaidia na:
- Huduma za serikali
- Hati za kidijitali
- Maelezo ya mchakato

Andika swali lako au chagua huduma.

0. Rudi";

const DOCUMENTS_INFO_TEXT: &str = "Hati za Kidijitali:

Kwa kutumia blockchain, hati zako zinaaminishwa.
Unaweza:
- Kupakia hati mpya
- Kuthibitisha hati
- Kuangalia historia

Andika 'pakia' au 'thibitisha'

0. Rudi";

// ============================================================================
// Steps
// ============================================================================

/// Menu nodes a session can rest on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Welcome,
    Services,
    Documents,
    Help,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Welcome, Step::Services, Step::Documents, Step::Help];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Welcome => "welcome",
            Step::Services => "services",
            Step::Documents => "documents",
            Step::Help => "help",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Step::Welcome => "Karibu Wanjiku 2.0!",
            Step::Services => "Huduma za Serikali",
            Step::Documents => "Hati za Kidijitali",
            Step::Help => "Msaada",
        }
    }

    /// Full screen text for this node.
    pub fn screen(&self) -> &'static str {
        match self {
            Step::Welcome => WELCOME_TEXT,
            Step::Services => SERVICES_TEXT,
            Step::Documents => DOCUMENTS_TEXT,
            Step::Help => HELP_TEXT,
        }
    }

    fn options(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Step::Welcome => &WELCOME_OPTIONS,
            Step::Services => &SERVICE_CATALOGUE,
            Step::Documents => &DOCUMENT_OPTIONS,
            Step::Help => &[],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown menu step '{}'", s))
    }
}

// ============================================================================
// Transition table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
    Anything,
}

impl Pattern {
    pub fn matches(&self, input: &str) -> bool {
        match self {
            Pattern::Exact(s) => input == *s,
            Pattern::Prefix(p) => input.starts_with(p),
            Pattern::Anything => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ShowMenu(Step),
    ServiceDetail,
    DocumentsInfo,
    FreeText,
}

/// What happens to `current_step` after the action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepChange {
    Set(Step),
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub pattern: Pattern,
    pub action: Action,
    pub step: StepChange,
}

const fn menu(input: &'static str, step: Step) -> Transition {
    Transition {
        pattern: Pattern::Exact(input),
        action: Action::ShowMenu(step),
        step: StepChange::Set(step),
    }
}

/// Ordered; first match wins. The final row always matches.
pub const TRANSITIONS: [Transition; 8] = [
    menu("", Step::Welcome),
    menu("0", Step::Welcome),
    menu("1", Step::Services),
    menu("2", Step::Documents),
    menu("3", Step::Help),
    Transition {
        pattern: Pattern::Prefix("1."),
        action: Action::ServiceDetail,
        step: StepChange::Keep,
    },
    Transition {
        pattern: Pattern::Prefix("2."),
        action: Action::DocumentsInfo,
        step: StepChange::Keep,
    },
    Transition {
        pattern: Pattern::Anything,
        action: Action::FreeText,
        step: StepChange::Keep,
    },
];

pub fn route(input: &str) -> Transition {
    TRANSITIONS
        .iter()
        .copied()
        .find(|t| t.pattern.matches(input))
        .unwrap_or(TRANSITIONS[TRANSITIONS.len() - 1])
}

// ============================================================================
// Screens
// ============================================================================

pub fn service_name(code: &str) -> &'static str {
    SERVICE_CATALOGUE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(GENERIC_SERVICE)
}

pub fn service_detail_screen(code: &str) -> String {
    format!(
        "Huduma: {}

Maelezo:
- Gharama: Tazama huduma
- Muda: Siku 7-30
- Mahitaji: Cheti cha kuzaliwa, Picha

Kwa maelezo zaidi, andika swali lako.

0. Rudi",
        service_name(code)
    )
}

pub fn documents_info_screen() -> &'static str {
    DOCUMENTS_INFO_TEXT
}

/// Cut `text` to at most `max_chars` characters, ending in [`ELLIPSIS`] when cut.
/// A budget too small for the ellipsis gets a plain cut.
pub fn fit_screen(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars < ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

// ============================================================================
// Menu tree (read-only view for API clients)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MenuOption {
    pub code: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UssdMenu {
    pub step: Step,
    pub title: &'static str,
    pub options: Vec<MenuOption>,
    pub text: &'static str,
}

pub fn menu_tree() -> Vec<UssdMenu> {
    Step::ALL
        .into_iter()
        .map(|step| UssdMenu {
            step,
            title: step.title(),
            options: step
                .options()
                .iter()
                .map(|&(code, label)| MenuOption { code, label })
                .collect(),
            text: step.screen(),
        })
        .collect()
}
