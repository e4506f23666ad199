//! Workflow step domain model.
//!
//! A step is one node of a template's navigation graph. Steps reference each
//! other by id (`next_step`, `decision_yes_next_step`, `decision_no_next_step`)
//! so the graph can hold loop-back cycles without recursive ownership.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Form payload submitted for a step, keyed by field name.
pub type FormData = Map<String, Value>;

/// Kind of work a step represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Performs work and records it through the step form.
    Action,
    /// Asks a yes/no question that picks the outgoing edge.
    Decision,
    /// Produces or collects a document.
    Document,
    /// Schedules or records a meeting.
    Meeting,
    /// Informs the dossier's stakeholders.
    Notification,
    /// Marks a point reached, usually without a form.
    Milestone,
}

impl Default for StepType {
    fn default() -> Self {
        Self::Action
    }
}

impl StepType {
    /// Lowercase name as stored and written in templates.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Decision => "decision",
            Self::Document => "document",
            Self::Meeting => "meeting",
            Self::Notification => "notification",
            Self::Milestone => "milestone",
        }
    }

    /// Parse a stored or authored name, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "action" => Some(Self::Action),
            "decision" => Some(Self::Decision),
            "document" => Some(Self::Document),
            "meeting" => Some(Self::Meeting),
            "notification" => Some(Self::Notification),
            "milestone" => Some(Self::Milestone),
            _ => None,
        }
    }
}

// ============================================================================
// Form schema
// ============================================================================

/// Input type of a form field. Unrecognised types are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    /// Single-line text.
    Text,
    /// Multi-line text.
    Textarea,
    /// Numeric input.
    Number,
    /// Calendar date.
    Date,
    /// Date with time of day.
    Datetime,
    /// Boolean tick box.
    Checkbox,
    /// Drop-down over `options`.
    Select,
    /// Radio group over `options`.
    Radio,
    /// Uploaded file reference.
    File,
    /// Email address.
    Email,
    /// Phone number.
    Phone,
    /// Any other type, passed through to the form renderer.
    Other(String),
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text" => Self::Text,
            "textarea" => Self::Textarea,
            "number" => Self::Number,
            "date" => Self::Date,
            "datetime" => Self::Datetime,
            "checkbox" => Self::Checkbox,
            "select" => Self::Select,
            "radio" => Self::Radio,
            "file" => Self::File,
            "email" => Self::Email,
            "phone" => Self::Phone,
            _ => Self::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Text => "text".to_string(),
            FieldType::Textarea => "textarea".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Date => "date".to_string(),
            FieldType::Datetime => "datetime".to_string(),
            FieldType::Checkbox => "checkbox".to_string(),
            FieldType::Select => "select".to_string(),
            FieldType::Radio => "radio".to_string(),
            FieldType::File => "file".to_string(),
            FieldType::Email => "email".to_string(),
            FieldType::Phone => "phone".to_string(),
            FieldType::Other(other) => other,
        }
    }
}

/// Choice offered by a select or radio field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Value stored in the form payload.
    pub value: String,
    /// Text shown to the user.
    pub label: String,
}

/// Comparison used by a visibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// The field equals `value`.
    Equals,
    /// The field is absent or differs from `value`.
    NotEquals,
    /// The field is one of the values in the `value` array.
    In,
    /// The field holds a non-empty value.
    IsSet,
}

/// Shows a field only when another field of the same form matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityRule {
    /// Name of the field the rule reads.
    pub field: String,
    /// How the field is compared.
    pub operator: ConditionOperator,
    /// Operand of the comparison; unused by `is_set`.
    #[serde(default)]
    pub value: Value,
}

impl VisibilityRule {
    /// Evaluate the rule against the current form payload.
    pub fn matches(&self, data: &FormData) -> bool {
        let current = data.get(&self.field);
        match self.operator {
            ConditionOperator::Equals => current == Some(&self.value),
            ConditionOperator::NotEquals => current != Some(&self.value),
            ConditionOperator::In => match (&self.value, current) {
                (Value::Array(candidates), Some(current)) => candidates.contains(current),
                _ => false,
            },
            ConditionOperator::IsSet => {
                matches!(current, Some(v) if !v.is_null() && v != &Value::String(String::new()))
            }
        }
    }
}

/// One field descriptor of a step's form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Key of the field in the form payload.
    pub name: String,
    /// Text shown next to the input.
    pub label: String,
    /// Input type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether a value must be submitted.
    #[serde(default)]
    pub required: bool,
    /// Choices for select and radio fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    /// Condition under which the field is shown; always shown when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<VisibilityRule>,
}

impl FormField {
    /// Whether the field is shown for the given payload.
    pub fn is_visible(&self, data: &FormData) -> bool {
        self.visible_when.as_ref().map_or(true, |rule| rule.matches(data))
    }
}

// ============================================================================
// Auto actions
// ============================================================================

/// Side effect a step triggers on completion, in the `{type, parameters}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum StepAction {
    /// Render a document from a named template.
    GenerateDocument {
        /// Document template name.
        template: String,
        /// File name of the rendered document.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_name: Option<String>,
    },
    /// Send an email built from a template.
    SendEmail {
        /// Email template name.
        template: String,
        /// Recipient roles or addresses.
        #[serde(default)]
        recipients: Vec<String>,
    },
    /// Book an appointment.
    CreateAppointment {
        /// Appointment title.
        title: String,
        /// Offset of the appointment from completion.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days_from_now: Option<u32>,
    },
    /// Open a follow-up task.
    CreateTask {
        /// Task title.
        title: String,
        /// Role the task is assigned to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee_role: Option<String>,
        /// Offset of the due date from completion.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_in_days: Option<u32>,
    },
    /// Set the dossier's business status.
    UpdateDossierStatus {
        /// New status value.
        status: String,
    },
    /// Post an in-app notification.
    CreateNotification {
        /// Notification text.
        message: String,
        /// Who should see the notification.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audience: Option<String>,
    },
    /// Duplicate the dossier into another business domain.
    TransferDossier {
        /// Code of the receiving domain.
        target_domain: String,
    },
    /// Hand a document over to another party or domain.
    TransferDocument {
        /// Kind of document transferred.
        document_type: String,
        /// Code of the receiving domain, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_domain: Option<String>,
    },
}

impl StepAction {
    /// Wire name of the action, as written in templates.
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::GenerateDocument { .. } => "generate_document",
            Self::SendEmail { .. } => "send_email",
            Self::CreateAppointment { .. } => "create_appointment",
            Self::CreateTask { .. } => "create_task",
            Self::UpdateDossierStatus { .. } => "update_dossier_status",
            Self::CreateNotification { .. } => "create_notification",
            Self::TransferDossier { .. } => "transfer_dossier",
            Self::TransferDocument { .. } => "transfer_document",
        }
    }
}

/// Action type names the engine knows how to dispatch.
pub const KNOWN_ACTION_TYPES: &[&str] = &[
    "generate_document",
    "send_email",
    "create_appointment",
    "create_task",
    "update_dossier_status",
    "create_notification",
    "transfer_dossier",
    "transfer_document",
];

/// An action whose type or parameters the engine does not recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueAction {
    /// Type name as authored.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Parameters as authored.
    #[serde(default)]
    pub parameters: Value,
}

/// Auto action as stored on a step: a known action or an opaque passthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoAction {
    /// An action with a typed shape.
    Known(StepAction),
    /// Anything else, forwarded untouched.
    Opaque(OpaqueAction),
}

impl AutoAction {
    /// Type name of the wrapped action.
    pub fn action_type(&self) -> &str {
        match self {
            Self::Known(action) => action.action_type(),
            Self::Opaque(action) => &action.action_type,
        }
    }
}

impl From<StepAction> for AutoAction {
    fn from(action: StepAction) -> Self {
        Self::Known(action)
    }
}

// ============================================================================
// Step
// ============================================================================

/// Outgoing routing of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Plain step.
    Linear {
        /// Successor; `None` on a terminal step.
        next: Option<Uuid>,
    },
    /// Decision step with one pointer per outcome.
    Decision {
        /// Successor after "yes".
        yes: Option<Uuid>,
        /// Successor after "no".
        no: Option<Uuid>,
    },
}

/// One node of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier.
    pub id: Uuid,
    /// Template the step belongs to.
    pub template_id: Uuid,
    /// Position in the template; 1 is the entry step.
    pub sequence_number: u32,
    /// Display name.
    pub name: String,
    /// Optional longer explanation.
    pub description: Option<String>,
    /// Kind of work.
    pub step_type: StepType,
    /// Completion must carry a yes/no decision.
    pub requires_decision: bool,
    /// The step may be skipped.
    pub is_optional: bool,
    /// The step is allowed to route back to an earlier step.
    pub can_loop_back: bool,
    /// Completion is irreversible; rollback is refused.
    pub is_final: bool,
    /// Fields of the step's form.
    pub form_schema: Vec<FormField>,
    /// Side effects dispatched after completion, in order.
    pub auto_actions: Vec<AutoAction>,
    /// Successor of a linear step.
    pub next_step: Option<Uuid>,
    /// Successor after a "yes" decision.
    pub decision_yes_next_step: Option<Uuid>,
    /// Successor after a "no" decision.
    pub decision_no_next_step: Option<Uuid>,
}

impl Step {
    /// New linear action step with no successor.
    pub fn new(template_id: Uuid, sequence_number: u32, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id,
            sequence_number,
            name: name.into(),
            description: None,
            step_type: StepType::default(),
            requires_decision: false,
            is_optional: false,
            can_loop_back: false,
            is_final: false,
            form_schema: Vec::new(),
            auto_actions: Vec::new(),
            next_step: None,
            decision_yes_next_step: None,
            decision_no_next_step: None,
        }
    }

    /// Set the step type.
    pub fn with_type(mut self, step_type: StepType) -> Self {
        self.step_type = step_type;
        self
    }

    /// Route a linear step to `next`.
    pub fn with_next(mut self, next: Uuid) -> Self {
        self.next_step = Some(next);
        self
    }

    /// Turn this step into a decision point. Clears any linear pointer.
    pub fn with_decision(mut self, yes: Option<Uuid>, no: Option<Uuid>) -> Self {
        self.requires_decision = true;
        self.step_type = StepType::Decision;
        self.next_step = None;
        self.decision_yes_next_step = yes;
        self.decision_no_next_step = no;
        self
    }

    /// Allow the step to be skipped.
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Allow the step to route back to an earlier one.
    pub fn looping(mut self) -> Self {
        self.can_loop_back = true;
        self
    }

    /// Protect the step from rollback.
    pub fn final_step(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Append a form field.
    pub fn with_field(mut self, field: FormField) -> Self {
        self.form_schema.push(field);
        self
    }

    /// Append an auto action.
    pub fn with_action(mut self, action: impl Into<AutoAction>) -> Self {
        self.auto_actions.push(action.into());
        self
    }

    /// The step's outgoing pointers, interpreted by `requires_decision`.
    pub fn routing(&self) -> Routing {
        if self.requires_decision {
            Routing::Decision {
                yes: self.decision_yes_next_step,
                no: self.decision_no_next_step,
            }
        } else {
            Routing::Linear {
                next: self.next_step,
            }
        }
    }

    /// Resolve the outgoing edge for a completion.
    ///
    /// A decision step without an outcome has no route.
    pub fn next_for(&self, decision: Option<bool>) -> Option<Uuid> {
        match self.routing() {
            Routing::Linear { next } => next,
            Routing::Decision { yes, no } => match decision {
                Some(true) => yes,
                Some(false) => no,
                None => None,
            },
        }
    }

    /// All pointer targets, whatever the routing mode.
    pub fn pointer_targets(&self) -> impl Iterator<Item = Uuid> + '_ {
        [
            self.next_step,
            self.decision_yes_next_step,
            self.decision_no_next_step,
        ]
        .into_iter()
        .flatten()
    }

    /// Edges the engine will actually follow.
    pub fn successors(&self) -> Vec<Uuid> {
        match self.routing() {
            Routing::Linear { next } => next.into_iter().collect(),
            Routing::Decision { yes, no } => {
                let mut out: Vec<Uuid> = yes.into_iter().collect();
                if let Some(no) = no {
                    if !out.contains(&no) {
                        out.push(no);
                    }
                }
                out
            }
        }
    }

    /// Whether no pointer of any kind leaves the step.
    pub fn is_terminal(&self) -> bool {
        self.pointer_targets().next().is_none()
    }

    /// Fields to render for the given payload.
    pub fn visible_fields<'a>(&'a self, data: &'a FormData) -> impl Iterator<Item = &'a FormField> {
        self.form_schema.iter().filter(move |f| f.is_visible(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_routing() {
        let yes = Uuid::new_v4();
        let step = Step::new(Uuid::new_v4(), 3, "Accept?").with_decision(Some(yes), None);

        assert_eq!(step.next_for(Some(true)), Some(yes));
        assert_eq!(step.next_for(Some(false)), None);
        assert_eq!(step.next_for(None), None);
        assert_eq!(step.successors(), vec![yes]);
    }

    #[test]
    fn test_with_decision_clears_linear_pointer() {
        let step = Step::new(Uuid::new_v4(), 1, "Check")
            .with_next(Uuid::new_v4())
            .with_decision(None, None);
        assert!(step.next_step.is_none());
        assert!(step.is_terminal());
    }

    #[test]
    fn test_auto_action_parses_known_and_opaque() {
        let actions: Vec<AutoAction> = serde_json::from_value(json!([
            {"type": "send_email", "parameters": {"template": "welcome", "recipients": ["client"]}},
            {"type": "archive_dossier", "parameters": {"retention_years": 10}}
        ]))
        .unwrap();

        assert!(matches!(
            &actions[0],
            AutoAction::Known(StepAction::SendEmail { template, .. }) if template == "welcome"
        ));
        match &actions[1] {
            AutoAction::Opaque(opaque) => {
                assert_eq!(opaque.action_type, "archive_dossier");
                assert_eq!(opaque.parameters["retention_years"], 10);
            }
            other => panic!("expected opaque action, got {other:?}"),
        }
    }

    #[test]
    fn test_opaque_action_serializes_verbatim() {
        let action = AutoAction::Opaque(OpaqueAction {
            action_type: "custom".to_string(),
            parameters: json!({"a": 1}),
        });
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({"type": "custom", "parameters": {"a": 1}}));
    }

    #[test]
    fn test_field_type_keeps_unknown_names() {
        let field: FormField = serde_json::from_value(json!({
            "name": "signature",
            "label": "Signature",
            "type": "signature_pad"
        }))
        .unwrap();
        assert_eq!(field.field_type, FieldType::Other("signature_pad".to_string()));
        assert!(!field.required);
    }

    #[test]
    fn test_visibility_rules() {
        let step = Step::new(Uuid::new_v4(), 1, "Visit")
            .with_field(FormField {
                name: "visit_done".to_string(),
                label: "Visit done".to_string(),
                field_type: FieldType::Checkbox,
                required: true,
                options: vec![],
                visible_when: None,
            })
            .with_field(FormField {
                name: "visit_date".to_string(),
                label: "Visit date".to_string(),
                field_type: FieldType::Date,
                required: true,
                options: vec![],
                visible_when: Some(VisibilityRule {
                    field: "visit_done".to_string(),
                    operator: ConditionOperator::Equals,
                    value: json!(true),
                }),
            });

        let mut data = FormData::new();
        assert_eq!(step.visible_fields(&data).count(), 1);

        data.insert("visit_done".to_string(), json!(true));
        assert_eq!(step.visible_fields(&data).count(), 2);
    }

    #[test]
    fn test_in_and_is_set_operators() {
        let rule = VisibilityRule {
            field: "kind".to_string(),
            operator: ConditionOperator::In,
            value: json!(["water", "fire"]),
        };
        let mut data = FormData::new();
        assert!(!rule.matches(&data));
        data.insert("kind".to_string(), json!("fire"));
        assert!(rule.matches(&data));

        let is_set = VisibilityRule {
            field: "kind".to_string(),
            operator: ConditionOperator::IsSet,
            value: Value::Null,
        };
        assert!(is_set.matches(&data));
        data.insert("kind".to_string(), json!(""));
        assert!(!is_set.matches(&data));
    }
}
