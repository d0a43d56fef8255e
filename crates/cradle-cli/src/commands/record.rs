use cradle_core::models::{
    AuditEntry, CollectionForm, CollectionSession, FingerCapture, LoginEvent, RecordId,
    SessionType,
};
use cradle_core::util::normalize_text_option;
use cradle_core::{SyncItem, SyncKind};

use crate::cli::RecordCommands;
use crate::commands::common::{open_outbox, parse_record_id};
use crate::config::RuntimeSettings;
use crate::error::CliError;

/// Write the record and its outbox entry; returns the new record's id.
pub async fn record_entity(
    command: RecordCommands,
    settings: &RuntimeSettings,
) -> Result<(RecordId, SyncItem), CliError> {
    let outbox = open_outbox(settings).await?;
    let config = &settings.config;

    let recorded = match command {
        RecordCommands::Session {
            operator_id,
            mother_ref,
            baby_ref,
            scanner_ref,
            recollection_of,
        } => {
            let origin = recollection_of
                .as_deref()
                .map(parse_record_id)
                .transpose()?;
            let session_type = if origin.is_some() {
                SessionType::Recollection
            } else {
                SessionType::FirstCollection
            };
            let mut session = CollectionSession::start(
                operator_id,
                mother_ref,
                baby_ref,
                scanner_ref,
                session_type,
            );
            session.origin_session_id = origin;

            let item = outbox
                .record_session(&session, Some(config.priority_for(SyncKind::Session)))
                .await?;
            (session.id, item)
        }
        RecordCommands::Finger {
            session,
            finger,
            quality,
            frames_ok,
            frames_total,
            outcome,
            image_path,
        } => {
            let mut capture = FingerCapture::new(
                parse_record_id(&session)?,
                finger.into(),
                quality,
                frames_ok,
                frames_total,
                outcome.into(),
            );
            capture.image_path = normalize_text_option(image_path);

            let item = outbox
                .record_finger_capture(&capture, Some(config.priority_for(SyncKind::Finger)))
                .await?;
            (capture.id, item)
        }
        RecordCommands::Form {
            session,
            questionnaire_version,
            temperature,
            humidity,
            notes,
            quick,
        } => {
            let mut form = CollectionForm::new(parse_record_id(&session)?, questionnaire_version);
            form.temperature = temperature;
            form.humidity = humidity;
            form.notes = normalize_text_option(notes);
            form.quick_collection = quick;

            let item = outbox
                .record_form(&form, Some(config.priority_for(SyncKind::Form)))
                .await?;
            (form.id, item)
        }
        RecordCommands::Audit {
            user_id,
            action,
            entity,
            entity_ref,
        } => {
            let mut entry = AuditEntry::new(user_id, action, entity);
            entry.entity_ref = normalize_text_option(entity_ref);

            let item = outbox
                .record_audit_entry(&entry, Some(config.priority_for(SyncKind::Audit)))
                .await?;
            (entry.id, item)
        }
        RecordCommands::LoginEvent {
            email,
            failed,
            reason,
        } => {
            let mut event = LoginEvent::new(email, !failed);
            event.failure_reason = normalize_text_option(reason);

            let item = outbox
                .record_login_event(&event, Some(config.priority_for(SyncKind::LoginEvent)))
                .await?;
            (event.id, item)
        }
    };

    Ok(recorded)
}

pub async fn run_record(
    command: RecordCommands,
    settings: &RuntimeSettings,
) -> Result<(), CliError> {
    let (record_id, item) = record_entity(command, settings).await?;
    println!("{record_id} (sync item {})", item.id);
    Ok(())
}
