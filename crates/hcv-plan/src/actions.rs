use std::collections::BTreeMap;
use std::fmt;

use hcv_model::FragmentKind;
use hcv_render::TemplateError;
use serde::{Deserialize, Serialize};

/// One step from actual toward desired state. Data only; the executor gives
/// it meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    EnableModule {
        name: String,
    },
    DisableModule {
        name: String,
    },
    /// Disable `dependents` and `from`, enable `to`, verify exactly `to` is
    /// enabled. `dependents` are modules that only load under `from` and are
    /// wanted off; they must go in the same step or `from` cannot be disabled.
    SwitchConcurrencyModel {
        from: Option<String>,
        to: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        dependents: Vec<String>,
    },
    WriteFragment {
        fragment: FragmentKind,
        content: String,
    },
    RegisterInclude {
        fragment: FragmentKind,
    },
    RestartService,
}

impl Action {
    /// Short stable label (`enable_module`, `restart_service`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Action::EnableModule { .. } => "enable_module",
            Action::DisableModule { .. } => "disable_module",
            Action::SwitchConcurrencyModel { .. } => "switch_concurrency_model",
            Action::WriteFragment { .. } => "write_fragment",
            Action::RegisterInclude { .. } => "register_include",
            Action::RestartService => "restart_service",
        }
    }

    /// Module name for enable/disable actions.
    pub fn module(&self) -> Option<&str> {
        match self {
            Action::EnableModule { name } | Action::DisableModule { name } => Some(name),
            _ => None,
        }
    }

    pub fn fragment(&self) -> Option<FragmentKind> {
        match self {
            Action::WriteFragment { fragment, .. } | Action::RegisterInclude { fragment } => {
                Some(*fragment)
            }
            _ => None,
        }
    }
}

impl Action {
    /// `prefork -> event`, plus `, disabling php8.2` when dependents go too.
    pub fn switch_target(&self) -> Option<String> {
        match self {
            Action::SwitchConcurrencyModel {
                from,
                to,
                dependents,
            } => {
                let mut t = format!("{} -> {to}", from.as_deref().unwrap_or("unknown"));
                if !dependents.is_empty() {
                    t.push_str(", disabling ");
                    t.push_str(&dependents.join(" "));
                }
                Some(t)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::EnableModule { name } | Action::DisableModule { name } => {
                write!(f, "{}({name})", self.kind())
            }
            Action::SwitchConcurrencyModel { .. } => {
                write!(f, "{}({})", self.kind(), self.switch_target().unwrap_or_default())
            }
            Action::WriteFragment { fragment, .. } | Action::RegisterInclude { fragment } => {
                write!(f, "{}({fragment})", self.kind())
            }
            Action::RestartService => f.write_str(self.kind()),
        }
    }
}

/// Ordered action sequence plus the fragments that could not be rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub render_failures: BTreeMap<FragmentKind, TemplateError>,
}

impl ActionPlan {
    /// No actions. Render failures alone do not make a plan non-empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn position<P>(&self, pred: P) -> Option<usize>
    where
        P: FnMut(&Action) -> bool,
    {
        self.actions.iter().position(pred)
    }

    pub fn contains(&self, action: &Action) -> bool {
        self.actions.contains(action)
    }
}

impl<'a> IntoIterator for &'a ActionPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
