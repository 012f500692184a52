//! Itemised run summaries returned by every stage.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Identity,
    TenantGrants,
    SiteGrant,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self {
            Self::Identity => "Stage 1: Service identity",
            Self::TenantGrants => "Stage 2: Tenant-wide permissions",
            Self::SiteGrant => "Stage 3: Site permission",
        };
        f.write_str(title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    AlreadySatisfied,
    Failed,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportItem {
    pub label: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fact {
    pub name: String,
    pub value: String,
}

/// Overall result of a stage that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// Everything required succeeded; some advisory checks did not.
    SucceededWithWarnings,
    /// At least one item failed; the rest of the stage still ran.
    PartiallyFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: Outcome,
    pub items: Vec<ReportItem>,
    pub facts: Vec<Fact>,
    /// What an independent re-query found after the grants.
    pub verification: Vec<String>,
    pub manual_follow_up: Vec<String>,
    pub next_steps: Vec<String>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            outcome: Outcome::Succeeded,
            items: Vec::new(),
            facts: Vec::new(),
            verification: Vec::new(),
            manual_follow_up: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, status: ItemStatus, detail: Option<String>) {
        self.items.push(ReportItem {
            label: label.into(),
            status,
            detail,
        });
        self.outcome = self.compute_outcome();
    }

    pub fn succeeded(&mut self, label: impl Into<String>) {
        self.push(label, ItemStatus::Succeeded, None);
    }

    pub fn already_satisfied(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.push(label, ItemStatus::AlreadySatisfied, Some(detail.into()));
    }

    pub fn failed(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.push(label, ItemStatus::Failed, Some(detail.into()));
    }

    pub fn warning(&mut self, label: impl Into<String>, detail: impl Into<String>) {
        self.push(label, ItemStatus::Warning, Some(detail.into()));
    }

    pub fn fact(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.facts.push(Fact {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn fact_value(&self, name: &str) -> Option<&str> {
        self.facts
            .iter()
            .find(|fact| fact.name == name)
            .map(|fact| fact.value.as_str())
    }

    pub fn follow_up(&mut self, step: impl Into<String>) {
        self.manual_follow_up.push(step.into());
    }

    pub fn next_step(&mut self, step: impl Into<String>) {
        self.next_steps.push(step.into());
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcome == Outcome::PartiallyFailed
    }

    fn compute_outcome(&self) -> Outcome {
        if self.count(ItemStatus::Failed) > 0 {
            Outcome::PartiallyFailed
        } else if self.count(ItemStatus::Warning) > 0 {
            Outcome::SucceededWithWarnings
        } else {
            Outcome::Succeeded
        }
    }
}
