//! Routers: the component at a node that picks the outgoing exit.

pub mod cases;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brook_excellent::{evaluate_template_value, functions, types, Environment, Value};

use crate::definition::Node;
use crate::waits::Wait;

/// A named bucket a router maps into, bound to one exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub uuid: Uuid,
    pub name: String,
    pub exit_uuid: Uuid,
}

/// One case of a switch router: a test function applied to the operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub test: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub category_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Router {
    /// Evaluates cases in order against the operand; first match wins,
    /// otherwise the default category.
    Switch {
        operand: String,
        #[serde(default)]
        cases: Vec<Case>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_category_uuid: Option<Uuid>,
        categories: Vec<Category>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait: Option<Wait>,
    },
    /// Picks a category uniformly at random.
    Random {
        categories: Vec<Category>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_name: Option<String>,
    },
}

/// What the router decided: a category, its exit, and the operand
/// reduction used to decide.
#[derive(Debug, Clone)]
pub struct RouterOutcome {
    pub category_uuid: Uuid,
    pub category_name: String,
    pub exit_uuid: Uuid,
    pub operand: Value,
    /// The matched fragment for switch routers, e.g. the word that hit.
    pub match_value: Option<Value>,
}

impl Router {
    pub fn categories(&self) -> &[Category] {
        match self {
            Router::Switch { categories, .. } => categories,
            Router::Random { categories, .. } => categories,
        }
    }

    pub fn result_name(&self) -> Option<&str> {
        match self {
            Router::Switch { result_name, .. } => result_name.as_deref(),
            Router::Random { result_name, .. } => result_name.as_deref(),
        }
    }

    pub fn wait(&self) -> Option<&Wait> {
        match self {
            Router::Switch { wait, .. } => wait.as_ref(),
            Router::Random { .. } => None,
        }
    }

    /// Checks that every category binds to an exit on the node and every
    /// case names a category.
    pub fn validate(&self, node: &Node) -> Result<(), String> {
        for category in self.categories() {
            if !node.exits.iter().any(|e| e.uuid == category.exit_uuid) {
                return Err(format!(
                    "category {} is bound to exit {} which is not on node {}",
                    category.uuid, category.exit_uuid, node.uuid
                ));
            }
        }
        if let Router::Switch { cases, default_category_uuid, categories, .. } = self {
            let has_category =
                |uuid: &Uuid| categories.iter().any(|c| c.uuid == *uuid);
            for case in cases {
                if !has_category(&case.category_uuid) {
                    return Err(format!(
                        "case {} names category {} which is not on the router",
                        case.uuid, case.category_uuid
                    ));
                }
            }
            if let Some(default) = default_category_uuid {
                if !has_category(default) {
                    return Err(format!("default category {} is not on the router", default));
                }
            }
        }
        Ok(())
    }

    /// Chooses a category. Fails only structurally (no category matched and
    /// no default) -- test evaluation errors just don't match.
    pub fn route(&self, env: &Environment, context: &Value) -> Result<RouterOutcome, String> {
        match self {
            Router::Switch { operand, cases, default_category_uuid, categories, .. } => {
                let operand_value = evaluate_template_value(env, context, operand);

                for case in cases {
                    let mut args = vec![operand_value.clone()];
                    for argument in &case.arguments {
                        args.push(evaluate_template_value(env, context, argument));
                    }
                    let result = functions::call(env, &case.test, &args);
                    if types::to_boolean(env, &result).unwrap_or(false) {
                        let category = category_by_uuid(categories, case.category_uuid)?;
                        return Ok(RouterOutcome {
                            category_uuid: category.uuid,
                            category_name: category.name.clone(),
                            exit_uuid: category.exit_uuid,
                            operand: operand_value,
                            match_value: Some(result.resolve("match")),
                        });
                    }
                }

                let default = default_category_uuid
                    .ok_or_else(|| "no case matched and no default category".to_string())?;
                let category = category_by_uuid(categories, default)?;
                Ok(RouterOutcome {
                    category_uuid: category.uuid,
                    category_name: category.name.clone(),
                    exit_uuid: category.exit_uuid,
                    operand: operand_value,
                    match_value: None,
                })
            }

            Router::Random { categories, .. } => {
                if categories.is_empty() {
                    return Err("random router has no categories".to_string());
                }
                let choice =
                    brook_excellent::random::random_below(categories.len() as u64) as usize;
                let category = &categories[choice];
                Ok(RouterOutcome {
                    category_uuid: category.uuid,
                    category_name: category.name.clone(),
                    exit_uuid: category.exit_uuid,
                    operand: Value::Number((choice as u64).into()),
                    match_value: None,
                })
            }
        }
    }
}

fn category_by_uuid(categories: &[Category], uuid: Uuid) -> Result<&Category, String> {
    categories
        .iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| format!("router has no category {}", uuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_excellent::types::object;

    fn switch_router() -> Router {
        cases::register_all();
        serde_json::from_value(serde_json::json!({
            "type": "switch",
            "operand": "@run.input.text",
            "cases": [{
                "uuid": "5d6abc80-39e7-4620-9988-a2447bffe526",
                "type": "has_any_word",
                "arguments": ["ok yes"],
                "category_uuid": "e4c0b6c6-53ee-447b-8483-22b66cb6f678"
            }],
            "default_category_uuid": "f9b2dcec-2e29-4a93-adf1-6b758c852ed8",
            "categories": [
                {
                    "uuid": "e4c0b6c6-53ee-447b-8483-22b66cb6f678",
                    "name": "Ok",
                    "exit_uuid": "37d8813f-1402-4ad2-9cc2-e9054a96525b"
                },
                {
                    "uuid": "f9b2dcec-2e29-4a93-adf1-6b758c852ed8",
                    "name": "Other",
                    "exit_uuid": "0680b01f-ba0b-48f4-a688-d2f963130126"
                }
            ],
            "result_name": "Response",
            "wait": {"type": "msg", "timeout": 300}
        }))
        .unwrap()
    }

    fn context(text: &str) -> Value {
        object(vec![(
            "run",
            object(vec![("input", object(vec![("text", Value::text(text))]))]),
        )])
    }

    #[test]
    fn switch_matches_first_case() {
        let router = switch_router();
        let outcome = router.route(&Environment::default(), &context("ok then")).unwrap();
        assert_eq!(outcome.category_name, "Ok");
        assert_eq!(
            outcome.exit_uuid,
            "37d8813f-1402-4ad2-9cc2-e9054a96525b".parse::<Uuid>().unwrap()
        );
        assert_eq!(outcome.match_value, Some(Value::text("ok")));
    }

    #[test]
    fn switch_falls_back_to_default() {
        let router = switch_router();
        let outcome = router.route(&Environment::default(), &context("nope")).unwrap();
        assert_eq!(outcome.category_name, "Other");
        assert!(outcome.match_value.is_none());
    }

    #[test]
    fn random_uses_the_shared_source() {
        let router: Router = serde_json::from_value(serde_json::json!({
            "type": "random",
            "categories": [
                {
                    "uuid": "e4c0b6c6-53ee-447b-8483-22b66cb6f678",
                    "name": "A",
                    "exit_uuid": "37d8813f-1402-4ad2-9cc2-e9054a96525b"
                },
                {
                    "uuid": "f9b2dcec-2e29-4a93-adf1-6b758c852ed8",
                    "name": "B",
                    "exit_uuid": "0680b01f-ba0b-48f4-a688-d2f963130126"
                }
            ]
        }))
        .unwrap();

        let first = {
            let _guard = brook_excellent::random::seeded_scope(7);
            router.route(&Environment::default(), &Value::Nil).unwrap()
        };
        let second = {
            let _guard = brook_excellent::random::seeded_scope(7);
            router.route(&Environment::default(), &Value::Nil).unwrap()
        };
        assert_eq!(first.category_uuid, second.category_uuid);
    }
}
