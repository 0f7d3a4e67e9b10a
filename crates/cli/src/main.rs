use clap::{Parser, Subcommand};
use std::sync::Arc;
use triage_core::config::{
    data_dir_from_env_value, passphrase_from_env_value, rules_file_from_env_value,
    session_timeout_from_env_value,
};
use triage_core::{
    ActivityAction, ActivityLog, CoreConfig, DoctorId, MessageCipher, MessagePipeline, PatientId,
    RecordStore, RuleEngine,
};

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Clinical message triage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one message through the triage pipeline
    Send {
        /// Doctor identifier
        doctor_id: String,
        /// Free-text message
        message: String,
    },
    /// Show a patient's clinical history
    Records {
        /// Patient identifier
        patient_id: String,
    },
    /// Show a doctor's audit trail
    Activity {
        /// Doctor identifier
        doctor_id: String,
        /// Decrypt logged messages (requires the encryption passphrase)
        #[arg(long)]
        decrypt: bool,
    },
    /// Decrypt an encrypted message blob
    Decrypt {
        /// Base64 blob as printed by `send` or stored in the audit trail
        blob: String,
    },
}

fn core_config() -> Result<Arc<CoreConfig>, Box<dyn std::error::Error>> {
    let data_dir = data_dir_from_env_value(std::env::var("TRIAGE_DATA_DIR").ok());
    let timeout =
        session_timeout_from_env_value(std::env::var("TRIAGE_SESSION_TIMEOUT_SECS").ok())?;
    Ok(Arc::new(CoreConfig::new(data_dir, timeout)?))
}

fn cipher() -> Result<MessageCipher, Box<dyn std::error::Error>> {
    let passphrase =
        passphrase_from_env_value(std::env::var("TRIAGE_ENCRYPTION_PASSPHRASE").ok())?;
    Ok(MessageCipher::from_passphrase(&passphrase)?)
}

fn rule_engine() -> Result<RuleEngine, Box<dyn std::error::Error>> {
    match rules_file_from_env_value(std::env::var("TRIAGE_RULES_FILE").ok()) {
        Some(path) => Ok(RuleEngine::from_yaml_file(&path)?),
        None => Ok(RuleEngine::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Send { doctor_id, message }) => {
            let pipeline = MessagePipeline::from_config(core_config()?, rule_engine()?, cipher()?);
            let result = pipeline.handle_message(&doctor_id, &message, None)?;
            println!("{}", result.response_text);
            println!();
            println!("Encrypted: {}", result.encrypted_message);
        }
        Some(Commands::Records { patient_id }) => {
            let patient_id = PatientId::parse(&patient_id)?;
            let store = RecordStore::new(core_config()?);
            let records = store.get_records(&patient_id)?;
            if records.is_empty() {
                println!("No records found.");
            }
            for entry in records {
                let diagnosis = &entry.diagnosis;
                println!(
                    "{}{}",
                    entry.recorded_at.to_rfc3339(),
                    if diagnosis.critical { " [CRITICAL]" } else { "" }
                );
                for suggestion in &diagnosis.suggestions {
                    println!("  - {}", suggestion);
                }
            }
        }
        Some(Commands::Activity { doctor_id, decrypt }) => {
            let doctor_id = DoctorId::parse(&doctor_id)?;
            let cipher = if decrypt { Some(cipher()?) } else { None };
            let log = ActivityLog::new(core_config()?);
            let entries = log.entries(&doctor_id)?;
            if entries.is_empty() {
                println!("No activity found.");
            }
            for entry in entries {
                println!("{} {}", entry.timestamp.to_rfc3339(), entry.action);
                for (key, value) in &entry.details {
                    println!("  {}: {}", key, value);
                }
                if let (Some(cipher), ActivityAction::MessageEncrypted) = (&cipher, entry.action) {
                    if let Some(blob) = entry.details.get("encrypted_message") {
                        match cipher.decrypt(blob) {
                            Ok(text) => println!("  decrypted: {}", text),
                            Err(e) => eprintln!("  decryption failed: {}", e),
                        }
                    }
                }
            }
        }
        Some(Commands::Decrypt { blob }) => {
            println!("{}", cipher()?.decrypt(&blob)?);
        }
        None => {
            println!("Use 'triage --help' for commands");
        }
    }

    Ok(())
}
