//! Binary entrypoint: JSON-lines command loop.
//!
//! Each input line is a Command (tagged by "op"). Output lines are either the
//! operation's result, an ErrorOutput, or an engine event (the notifier
//! writes events to the same stream). Logs go to stderr via tracing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use dispatch_engine::events::{EngineEvent, LogBroadcaster, Notifier};
use dispatch_engine::scoring::KeywordScorer;
use dispatch_engine::types::{
  AssignmentId, AssignmentStatus, ErrorOutput, GeoPoint, IncidentId, IncidentStatus, NewIncident,
  NewResponder, ResponderId,
};
use dispatch_engine::{sweeper, DispatchEngine, DispatchRequest, EngineConfig, EngineError};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
  CreateIncident {
    #[serde(flatten)]
    incident: NewIncident,
  },
  RegisterResponder {
    #[serde(flatten)]
    responder: NewResponder,
  },
  UpdateStatus {
    incident_id: IncidentId,
    to: IncidentStatus,
    #[serde(default = "default_actor")]
    actor: String,
  },
  Verify {
    incident_id: IncidentId,
    #[serde(default = "default_actor")]
    actor: String,
  },
  Escalate {
    incident_id: IncidentId,
    reason: String,
  },
  Dispatch {
    incident_id: IncidentId,
    request: DispatchRequest,
    #[serde(default = "default_actor")]
    actor: String,
  },
  PositionUpdate {
    responder_id: ResponderId,
    position: GeoPoint,
    timestamp: DateTime<Utc>,
  },
  AssignmentUpdate {
    assignment_id: AssignmentId,
    to: AssignmentStatus,
  },
  SetDuty {
    responder_id: ResponderId,
    on_duty: bool,
    available: bool,
  },
  Stats,
  ListOverdue,
  ListRequiringEscalation,
}

fn default_actor() -> String {
  "OPERATOR".to_string()
}

/// Notifier that writes engine events as JSON lines to stdout.
struct StdoutNotifier;

impl Notifier for StdoutNotifier {
  fn notify(&self, event: &EngineEvent) {
    if let Ok(line) = serde_json::to_string(event) {
      println!("{line}");
    }
  }
}

async fn handle(
  engine: &Arc<DispatchEngine>,
  command: Command,
) -> Result<serde_json::Value, EngineError> {
  match command {
    Command::CreateIncident { incident } => {
      let created = engine.create_incident(incident).await;
      Ok(serde_json::to_value(created)?)
    }
    Command::RegisterResponder { responder } => {
      let registered = engine.register_responder(responder).await;
      Ok(serde_json::to_value(registered)?)
    }
    Command::UpdateStatus {
      incident_id,
      to,
      actor,
    } => {
      let updated = engine.update_status(&incident_id, to, &actor).await?;
      Ok(serde_json::to_value(updated)?)
    }
    Command::Verify { incident_id, actor } => {
      let updated = engine.verify(&incident_id, &actor).await?;
      Ok(serde_json::to_value(updated)?)
    }
    Command::Escalate {
      incident_id,
      reason,
    } => {
      let updated = engine.escalate(&incident_id, &reason).await?;
      Ok(serde_json::to_value(updated)?)
    }
    Command::Dispatch {
      incident_id,
      request,
      actor,
    } => {
      let assignments = engine.dispatch(&incident_id, request, &actor).await?;
      Ok(serde_json::to_value(assignments)?)
    }
    Command::PositionUpdate {
      responder_id,
      position,
      timestamp,
    } => {
      let accepted = engine
        .update_position(&responder_id, position, timestamp)
        .await?;
      Ok(json!({ "accepted": accepted }))
    }
    Command::AssignmentUpdate { assignment_id, to } => {
      let updated = engine.update_assignment(&assignment_id, to).await?;
      Ok(serde_json::to_value(updated)?)
    }
    Command::SetDuty {
      responder_id,
      on_duty,
      available,
    } => {
      let updated = engine
        .set_responder_duty(&responder_id, on_duty, available)
        .await?;
      Ok(serde_json::to_value(updated)?)
    }
    Command::Stats => Ok(serde_json::to_value(engine.get_statistics().await)?),
    Command::ListOverdue => Ok(serde_json::to_value(engine.list_overdue().await)?),
    Command::ListRequiringEscalation => {
      Ok(serde_json::to_value(engine.list_requiring_escalation().await)?)
    }
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let engine = Arc::new(DispatchEngine::new(
    EngineConfig::default(),
    Arc::new(KeywordScorer),
    Arc::new(StdoutNotifier),
    Arc::new(LogBroadcaster),
  ));
  let _sweeper = sweeper::spawn(Arc::clone(&engine));

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let command: Command = match serde_json::from_str(trimmed) {
      Ok(c) => c,
      Err(e) => {
        let err = ErrorOutput::new(format!("json parse: {e}"));
        if let Ok(out) = serde_json::to_string(&err) {
          println!("{out}");
        }
        continue;
      }
    };

    match handle(&engine, command).await {
      Ok(value) => println!("{value}"),
      Err(e) => {
        let err = ErrorOutput::new(e.to_string());
        if let Ok(out) = serde_json::to_string(&err) {
          println!("{out}");
        }
      }
    }
  }
}
