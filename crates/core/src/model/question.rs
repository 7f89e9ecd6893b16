use serde::{Deserialize, Serialize};

use crate::model::ids::{CaseId, GroupId, ParameterId, QuestionId};

/// A measured quantity shown alongside a case (e.g. an angle on a cephalogram).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParameterId,
    pub name: String,
    pub description: String,
    pub reference_values: String,
    pub order: i32,
}

/// Values of one parameter at the three observation points of a case.
///
/// `value3` belongs to the held-out observation and is stripped before a
/// question is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub parameter_id: ParameterId,
    pub value1: f64,
    pub value2: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub code: String,
    pub gender: String,
    pub age1: i32,
    pub age2: i32,
    pub age3: i32,
    pub parameters: Vec<Parameter>,
    #[serde(rename = "parameters_values")]
    pub parameter_values: Vec<ParameterValue>,
}

impl Case {
    /// Drop every held-out value so it cannot leave the server with the question.
    pub fn redact_held_out(&mut self) {
        for value in &mut self.parameter_values {
            value.value3 = None;
        }
    }

    #[must_use]
    pub fn has_held_out_values(&self) -> bool {
        self.parameter_values.iter().any(|v| v.value3.is_some())
    }

    /// The held-out observation, revealed after the user has answered.
    #[must_use]
    pub fn outcome(&self) -> CaseOutcome {
        CaseOutcome {
            case_id: self.id,
            age3: self.age3,
            values: self
                .parameter_values
                .iter()
                .map(|v| HeldOutValue {
                    parameter_id: v.parameter_id,
                    value3: v.value3,
                })
                .collect(),
        }
    }
}

/// A multiple-choice question about a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<String>,
    pub prediction_age: i32,
    pub case: Case,
    #[serde(with = "group_wire")]
    pub group: Option<GroupId>,
}

impl Question {
    /// Consume the question and return it with held-out values removed.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.case.redact_held_out();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldOutValue {
    pub parameter_id: ParameterId,
    pub value3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub case_id: CaseId,
    pub age3: i32,
    pub values: Vec<HeldOutValue>,
}

//
// ─── AUTHORING ────────────────────────────────────────────────────────────────
//

/// Parameter definition to be inserted by the seeding tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParameter {
    pub name: String,
    pub description: String,
    pub reference_values: String,
    pub order: i32,
}

/// Case content to be inserted by the seeding tools.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCase {
    pub code: String,
    pub gender: String,
    pub age1: i32,
    pub age2: i32,
    pub age3: i32,
    pub parameter_values: Vec<ParameterValue>,
}

/// Question content; `correct` must be one of `options`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct: String,
    pub prediction_age: i32,
    pub case_id: CaseId,
    pub group: GroupId,
}

impl NewQuestion {
    #[must_use]
    pub fn has_valid_correct_option(&self) -> bool {
        self.options.iter().any(|o| o == &self.correct)
    }
}

/// Serialises an optional group using the `0` wire sentinel.
mod group_wire {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::model::ids::GroupId;

    pub fn serialize<S: Serializer>(group: &Option<GroupId>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(GroupId::to_wire(*group))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<GroupId>, D::Error> {
        let raw = i64::deserialize(d)?;
        Ok(GroupId::from_wire(raw))
    }
}
