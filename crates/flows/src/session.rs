//! The session: the state machine a caller persists between interactions.
//!
//! A session resumes, sweeps nodes until a wait or terminal exit, and
//! returns the events emitted along the way. All state mutation funnels
//! through `apply_event` -- the sweep decides *what* happens, the fold
//! decides *how* state changes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brook_excellent::{types, Environment};

use crate::actions::ActionContext;
use crate::assets::SessionAssets;
use crate::contacts::Contact;
use crate::context;
use crate::definition::{Flow, Node};
use crate::engine::{EngineConfig, EngineError};
use crate::events::{Event, EventKind};
use crate::references::FlowReference;
use crate::routers::cases;
use crate::runs::{Input, Run, RunResult, RunStatus, Step, WebhookResult};
use crate::triggers::Trigger;
use crate::utils;
use crate::waits::Wait;

/// Visits of one node by one run within a single resume before the sweep
/// is declared stuck.
const MAX_NODE_VISITS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Waiting,
    Completed,
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contact: Option<Contact>,
    trigger: Trigger,
    /// Stack order: innermost run last.
    #[serde(default)]
    runs: Vec<Run>,
    status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait: Option<Wait>,
    /// Feeds the monotonically increasing event index.
    #[serde(default)]
    event_count: u64,
}

impl Session {
    // ── accessors ─────────────────────────────

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn wait(&self) -> Option<&Wait> {
        self.wait.as_ref()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn get_run(&self, uuid: Uuid) -> Option<&Run> {
        self.runs.iter().find(|r| r.uuid == uuid)
    }

    /// The innermost run started by the given run.
    pub fn child_of(&self, uuid: Uuid) -> Option<&Run> {
        self.runs.iter().rev().find(|r| r.parent_uuid == Some(uuid))
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.environment.now().instant().with_timezone(&Utc)
    }

    // ── lifecycle ─────────────────────────────

    /// Starts a new session from a trigger and sweeps until a wait or
    /// completion.
    pub fn start(
        environment: Environment,
        contact: Contact,
        trigger: Trigger,
        assets: &SessionAssets,
        config: &EngineConfig,
    ) -> Result<(Session, Vec<Event>), EngineError> {
        cases::register_all();

        let flow = assets.get_flow(trigger.flow().uuid).map_err(|e| {
            EngineError::InvalidSession { message: e.to_string() }
        })?;

        let mut session = Session {
            environment,
            contact: Some(contact.clone()),
            trigger,
            runs: Vec::new(),
            status: SessionStatus::Created,
            wait: None,
            event_count: 0,
        };

        let now = session.now_utc();
        let flow_ref = FlowReference { uuid: flow.uuid, name: flow.name.clone() };
        session.runs.push(Run::new(flow_ref, contact, None, now));
        session.status = SessionStatus::Active;

        tracing::debug!(flow = %flow.uuid, "starting session");
        let mut output = Vec::new();
        session.sweep(assets, config, &mut output);
        Ok((session, output))
    }

    /// Resumes a waiting session with caller events.
    pub fn resume(
        &mut self,
        caller_events: Vec<Event>,
        assets: &SessionAssets,
        config: &EngineConfig,
    ) -> Result<Vec<Event>, EngineError> {
        cases::register_all();
        let mut output = Vec::new();

        match self.status {
            SessionStatus::Waiting => {
                let wait = self.wait.clone().ok_or_else(|| EngineError::InvalidSession {
                    message: "session is waiting but has no wait".to_string(),
                })?;
                if !wait.can_resume(&caller_events) {
                    return Err(EngineError::CannotResume {
                        message: "caller events don't satisfy the wait".to_string(),
                    });
                }
                for event in &caller_events {
                    if !event.kind().is_caller_event() {
                        return Err(EngineError::CannotResume {
                            message: format!("'{}' is not a caller event", event.type_name()),
                        });
                    }
                }
                self.wait = None;
                self.status = SessionStatus::Active;
                for event in caller_events {
                    self.append(event, None, &mut output);
                }
                if let Some(idx) = self.runs.iter().rposition(|r| r.status == RunStatus::Waiting) {
                    self.runs[idx].status = RunStatus::Active;
                }
            }
            SessionStatus::Active => {}
            _ => {
                return Err(EngineError::CannotResume {
                    message: "session is not active or waiting".to_string(),
                })
            }
        }

        // every asset referenced by an active run must still resolve
        for i in 0..self.runs.len() {
            if !self.runs[i].is_active() {
                continue;
            }
            if let Err(e) = assets.get_flow(self.runs[i].flow.uuid) {
                self.emit(EventKind::FatalError { text: e.to_string() }, None, &mut output);
                return Ok(output);
            }
        }

        self.sweep(assets, config, &mut output);
        Ok(output)
    }

    // ── the sweep ─────────────────────────────

    /// Drives the innermost active run until the session waits, completes
    /// or errors.
    fn sweep(&mut self, assets: &SessionAssets, config: &EngineConfig, output: &mut Vec<Event>) {
        let mut visits: HashMap<(Uuid, Uuid), u32> = HashMap::new();

        while self.status == SessionStatus::Active {
            let Some(idx) = self.runs.iter().rposition(|r| r.status == RunStatus::Active) else {
                self.status = SessionStatus::Completed;
                break;
            };

            let flow = match self.flow_for(assets, idx, output) {
                Some(flow) => flow,
                None => break,
            };

            if self.runs[idx].path.is_empty() {
                // a fresh run enters at the flow's first node
                match flow.nodes.first() {
                    Some(node) => {
                        let start = node.uuid;
                        self.visit_from(assets, config, idx, &flow, start, output, &mut visits);
                    }
                    None => self.complete_run(idx),
                }
            } else {
                // re-entry after a wait or a completed child: route the
                // current node without re-running its actions
                let node_uuid = match self.runs[idx].current_step() {
                    Some(step) if step.exit_uuid.is_none() => step.node_uuid,
                    _ => {
                        self.emit(
                            EventKind::FatalError {
                                text: "active run has no node to continue from".to_string(),
                            },
                            Some(idx),
                            output,
                        );
                        break;
                    }
                };
                let Some(node) = flow.get_node(node_uuid).cloned() else {
                    self.emit(
                        EventKind::FatalError {
                            text: format!("run is at node {} which is no longer in the flow", node_uuid),
                        },
                        Some(idx),
                        output,
                    );
                    break;
                };
                let dest = self.route_node(config, idx, &flow, &node, output);
                if self.status != SessionStatus::Active {
                    break;
                }
                match dest {
                    Some(next) => {
                        self.visit_from(assets, config, idx, &flow, next, output, &mut visits)
                    }
                    None => self.complete_run(idx),
                }
            }
        }
    }

    /// Visits nodes from `start` until this run waits, descends into a
    /// child, completes or errors.
    #[allow(clippy::too_many_arguments)]
    fn visit_from(
        &mut self,
        assets: &SessionAssets,
        config: &EngineConfig,
        run_idx: usize,
        flow: &Arc<Flow>,
        start: Uuid,
        output: &mut Vec<Event>,
        visits: &mut HashMap<(Uuid, Uuid), u32>,
    ) {
        let mut current = start;

        loop {
            let run_uuid = self.runs[run_idx].uuid;
            let seen = visits.entry((run_uuid, current)).or_insert(0);
            *seen += 1;
            if *seen > MAX_NODE_VISITS {
                self.emit(
                    EventKind::FatalError {
                        text: format!("node {} visited more than {} times", current, MAX_NODE_VISITS),
                    },
                    Some(run_idx),
                    output,
                );
                return;
            }

            let Some(node) = flow.get_node(current).cloned() else {
                self.emit(
                    EventKind::FatalError {
                        text: format!("destination {} is not a node in the flow", current),
                    },
                    Some(run_idx),
                    output,
                );
                return;
            };

            let now = self.now_utc();
            self.runs[run_idx].path.push(Step {
                uuid: utils::new_uuid(),
                node_uuid: current,
                arrived_on: now,
                exit_uuid: None,
                events: Vec::new(),
            });

            // actions speak through events only
            let mut triggered_flows: Vec<FlowReference> = Vec::new();
            for action in &node.actions {
                let kinds = {
                    let run = &self.runs[run_idx];
                    let ctx_value = context::build(&self.environment, self, run);
                    let ctx = ActionContext {
                        env: &self.environment,
                        assets,
                        config,
                        flow: flow.as_ref(),
                        contact: self.contact.as_ref(),
                        run,
                        context: &ctx_value,
                    };
                    action.execute(&ctx)
                };
                for kind in kinds {
                    if let EventKind::FlowTriggered { flow: child, .. } = &kind {
                        triggered_flows.push(child.clone());
                    }
                    self.emit(kind, Some(run_idx), output);
                }
                if self.status != SessionStatus::Active {
                    return;
                }
            }

            // push child runs; the driver loop descends into them before
            // this run routes out of the node
            if !triggered_flows.is_empty() {
                let now = self.now_utc();
                let parent_uuid = self.runs[run_idx].uuid;
                let contact = self.runs[run_idx].contact.clone();
                for child in triggered_flows.into_iter().rev() {
                    self.runs.push(Run::new(child, contact.clone(), Some(parent_uuid), now));
                }
                return;
            }

            // a router with a wait suspends before routing; the resume
            // path routes this node with the new input
            if let Some(wait_spec) = node.router.as_ref().and_then(|r| r.wait()) {
                let mut wait = wait_spec.clone();
                wait.begin(self.now_utc());
                self.emit(wait.event(), Some(run_idx), output);
                return;
            }

            let dest = self.route_node(config, run_idx, flow, &node, output);
            if self.status != SessionStatus::Active {
                return;
            }
            match dest {
                Some(next) => current = next,
                None => {
                    self.complete_run(run_idx);
                    return;
                }
            }
        }
    }

    /// Picks the node's exit: via the router when there is one, else the
    /// first exit. Returns the destination node, or None for terminal.
    fn route_node(
        &mut self,
        _config: &EngineConfig,
        run_idx: usize,
        flow: &Arc<Flow>,
        node: &Node,
        output: &mut Vec<Event>,
    ) -> Option<Uuid> {
        let exit_uuid = match &node.router {
            None => match node.exits.first() {
                Some(exit) => exit.uuid,
                None => {
                    self.set_exit(run_idx, None);
                    return None;
                }
            },
            Some(router) => {
                let outcome = {
                    let run = &self.runs[run_idx];
                    let ctx_value = context::build(&self.environment, self, run);
                    router.route(&self.environment, &ctx_value)
                };
                let outcome = match outcome {
                    Ok(outcome) => outcome,
                    Err(message) => {
                        self.emit(EventKind::FatalError { text: message }, Some(run_idx), output);
                        return None;
                    }
                };

                if let Some(name) = router.result_name() {
                    let env = &self.environment;
                    let operand_text =
                        types::to_text(env, &outcome.operand).unwrap_or_default();
                    let value = match &outcome.match_value {
                        Some(matched) if !matched.is_error() => {
                            types::to_text(env, matched).unwrap_or_else(|_| operand_text.clone())
                        }
                        _ => operand_text.clone(),
                    };
                    let languages = self
                        .environment
                        .language_order(self.contact.as_ref().and_then(|c| c.language.as_deref()));
                    let localized = flow.localize_text(
                        &languages,
                        outcome.category_uuid,
                        "name",
                        &outcome.category_name,
                    );
                    let node_uuid = node.uuid;
                    let kind = EventKind::RunResultChanged {
                        name: name.to_string(),
                        value,
                        category: outcome.category_name.clone(),
                        category_localized: (localized != outcome.category_name)
                            .then(|| localized.to_string()),
                        node_uuid,
                        input: Some(operand_text),
                    };
                    self.emit(kind, Some(run_idx), output);
                }
                outcome.exit_uuid
            }
        };

        self.set_exit(run_idx, Some(exit_uuid));
        node.exits
            .iter()
            .find(|e| e.uuid == exit_uuid)
            .and_then(|e| e.destination_node_uuid)
    }

    fn set_exit(&mut self, run_idx: usize, exit_uuid: Option<Uuid>) {
        if let Some(step) = self.runs[run_idx].current_step_mut() {
            step.exit_uuid = exit_uuid;
        }
    }

    fn complete_run(&mut self, run_idx: usize) {
        let now = self.now_utc();
        self.runs[run_idx].exit(RunStatus::Completed, now);
        tracing::debug!(run = %self.runs[run_idx].uuid, "run completed");
    }

    fn flow_for(
        &mut self,
        assets: &SessionAssets,
        run_idx: usize,
        output: &mut Vec<Event>,
    ) -> Option<Arc<Flow>> {
        match assets.get_flow(self.runs[run_idx].flow.uuid) {
            Ok(flow) => Some(flow),
            Err(e) => {
                self.emit(EventKind::FatalError { text: e.to_string() }, Some(run_idx), output);
                None
            }
        }
    }

    // ── the event log ─────────────────────────

    /// Emits a new engine event: stamps it, applies it, delivers it.
    fn emit(&mut self, kind: EventKind, run_idx: Option<usize>, output: &mut Vec<Event>) {
        let event = Event::at(kind, self.now_utc());
        self.append(event, run_idx, output);
    }

    /// Appends an event (new or caller-supplied) to the log: assigns the
    /// session index, records it on the current step, applies it.
    fn append(&mut self, mut event: Event, run_idx: Option<usize>, output: &mut Vec<Event>) {
        event.index = self.event_count;
        self.event_count += 1;

        if let Some(idx) = run_idx {
            if let Some(step) = self.runs[idx].current_step_mut() {
                event.step_uuid = Some(step.uuid);
                let index = event.index;
                step.events.push(index);
            }
        }

        self.apply_event(run_idx, &event);
        output.push(event);
    }

    /// The fold: the only place run and contact state changes.
    fn apply_event(&mut self, run_idx: Option<usize>, event: &Event) {
        match event.kind() {
            EventKind::MsgReceived { text, urn, channel, attachments } => {
                let input = Input {
                    uuid: utils::new_uuid(),
                    input_type: "msg".to_string(),
                    created_on: event.created_on,
                    text: text.clone(),
                    attachments: attachments.clone(),
                    urn: urn.clone(),
                    channel: channel.clone(),
                };
                let target = run_idx.or_else(|| {
                    self.runs.iter().rposition(|r| {
                        matches!(r.status, RunStatus::Waiting | RunStatus::Active)
                    })
                });
                if let Some(idx) = target {
                    self.runs[idx].input = Some(input);
                }
            }

            EventKind::ContactNameChanged { name } => {
                self.each_contact(|c| c.name = name.clone());
            }
            EventKind::ContactLanguageChanged { language } => {
                let language = (!language.is_empty()).then(|| language.clone());
                self.each_contact(|c| c.language = language.clone());
            }
            EventKind::ContactChannelChanged { channel } => {
                self.each_contact(|c| c.channel = Some(channel.clone()));
            }
            EventKind::ContactUrnAdded { urn } => {
                if let Ok(parsed) = crate::contacts::ContactUrn::parse(urn) {
                    self.each_contact(|c| {
                        if !c.has_urn(&parsed.scheme, &parsed.path) {
                            c.urns.push(parsed.clone());
                        }
                    });
                }
            }
            EventKind::ContactFieldChanged { field, value } => {
                let key = field.key.clone();
                let value = crate::contacts::FieldValue { text: value.clone() };
                self.each_contact(|c| {
                    c.fields.insert(key.clone(), value.clone());
                });
            }
            EventKind::ContactGroupsAdded { groups } => {
                self.each_contact(|c| {
                    for group in groups {
                        c.add_group(group.clone());
                    }
                });
            }
            EventKind::ContactGroupsRemoved { groups } => {
                self.each_contact(|c| {
                    for group in groups {
                        c.remove_group(group.uuid);
                    }
                });
            }

            EventKind::RunResultChanged {
                name,
                value,
                category,
                category_localized,
                node_uuid,
                input,
            } => {
                if let Some(idx) = run_idx {
                    self.runs[idx].save_result(RunResult {
                        name: name.clone(),
                        value: value.clone(),
                        category: category.clone(),
                        category_localized: category_localized.clone(),
                        node_uuid: *node_uuid,
                        created_on: event.created_on,
                        input: input.clone(),
                    });
                }
            }

            EventKind::WebhookCalled { url, status, status_code, response, .. } => {
                if let Some(idx) = run_idx {
                    self.runs[idx].webhook = Some(WebhookResult {
                        url: url.clone(),
                        status: status.clone(),
                        status_code: *status_code,
                        body: response.clone(),
                    });
                }
            }

            EventKind::MsgWait { timeout, timeout_on } => {
                self.wait = Some(Wait::Msg { timeout: *timeout, timeout_on: *timeout_on });
                if let Some(idx) = run_idx {
                    self.runs[idx].status = RunStatus::Waiting;
                }
                self.status = SessionStatus::Waiting;
            }
            EventKind::NothingWait {} => {
                self.wait = Some(Wait::Nothing);
                if let Some(idx) = run_idx {
                    self.runs[idx].status = RunStatus::Waiting;
                }
                self.status = SessionStatus::Waiting;
            }

            EventKind::RunExpired { run_uuid } => {
                let now = self.now_utc();
                if let Some(run) = self.runs.iter_mut().find(|r| r.uuid == *run_uuid) {
                    run.exit(RunStatus::Expired, now);
                }
            }

            EventKind::FatalError { text } => {
                tracing::debug!(error = %text, "session errored");
                let now = self.now_utc();
                if let Some(idx) = run_idx {
                    self.runs[idx].exit(RunStatus::Errored, now);
                }
                self.status = SessionStatus::Errored;
                self.wait = None;
            }

            // purely informational events
            EventKind::MsgCreated { .. }
            | EventKind::BroadcastCreated { .. }
            | EventKind::EmailCreated { .. }
            | EventKind::InputLabelsAdded { .. }
            | EventKind::WaitTimedOut {}
            | EventKind::FlowTriggered { .. }
            | EventKind::SessionTriggered { .. }
            | EventKind::Error { .. } => {}
        }
    }

    /// Applies a contact mutation to the session contact and every active
    /// run's snapshot.
    fn each_contact(&mut self, mut apply: impl FnMut(&mut Contact)) {
        if let Some(contact) = self.contact.as_mut() {
            apply(contact);
        }
        for run in &mut self.runs {
            if run.is_active() {
                apply(&mut run.contact);
            }
        }
    }
}
