//! # Ingestion Loop
//!
//! Drains the stream handle's queue one message at a time and writes one fact
//! per announced prefix whose origin can be determined.
//!
//! Whether the RPKI validator gates the output is a deployment decision, so it
//! is expressed as an [`EmitPolicy`]:
//!
//! - `All` writes every fact without asking the validator.
//! - `OnlyValid` writes facts the validator accepts. What happens to facts the
//!   validator cannot judge (`Unknown`) is decided by [`UnknownPolicy`].
//! - `Annotate` writes every fact followed by its verdict.

use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::core::kill_switch::KillSwitch;
use crate::core::sink::{Fact, ResultWriter, SinkError};
use crate::protocol::ris_message::{ServerEvent, ServerMessage};
use crate::protocol::validity::Verdict;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("emit policy '{0}' needs a validator but none is configured")]
    MissingValidator(EmitPolicy),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Anything that can judge an (origin AS, prefix) pair.
pub trait OriginValidator: Send + Sync {
    fn validate(&self, origin_asn: &str, prefix: &str) -> impl Future<Output = Verdict> + Send;
}

/// Placeholder validator for ingestors that never validate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidator;

impl OriginValidator for NoValidator {
    fn validate(&self, _origin_asn: &str, _prefix: &str) -> impl Future<Output = Verdict> + Send {
        std::future::ready(Verdict::Unknown)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmitPolicy {
    #[default]
    All,
    #[serde(alias = "only-valid")]
    OnlyValid,
    Annotate,
}

impl EmitPolicy {
    pub fn needs_validator(self) -> bool {
        !matches!(self, EmitPolicy::All)
    }
}

impl std::fmt::Display for EmitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EmitPolicy::All => "all",
            EmitPolicy::OnlyValid => "onlyValid",
            EmitPolicy::Annotate => "annotate",
        })
    }
}

impl FromStr for EmitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "all" => Ok(EmitPolicy::All),
            "onlyvalid" => Ok(EmitPolicy::OnlyValid),
            "annotate" => Ok(EmitPolicy::Annotate),
            _ => Err(format!("unknown emit policy '{}' (all, only-valid, annotate)", s)),
        }
    }
}

/// Fate of a fact whose verdict is `Unknown` under [`EmitPolicy::OnlyValid`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnknownPolicy {
    #[default]
    Reject,
    Accept,
}

impl FromStr for UnknownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(UnknownPolicy::Reject),
            "accept" => Ok(UnknownPolicy::Accept),
            _ => Err(format!("unknown verdict policy '{}' (reject, accept)", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    /// Drop IPv6 prefixes.
    #[serde(default)]
    pub only_ipv4: bool,
    #[serde(default)]
    pub emit_policy: EmitPolicy,
    #[serde(default)]
    pub unknown_policy: UnknownPolicy,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub messages: u64,
    pub pongs: u64,
    /// `ris_message`s without a single origin AS.
    pub skipped: u64,
    pub emitted: u64,
    pub rejected: u64,
}

enum Decision {
    Emit(Option<Verdict>),
    Reject(Verdict),
}

/// The consumer side of a RIS Live session.
pub struct Ingestor<V = NoValidator> {
    options: IngestOptions,
    validator: Option<V>,
}

impl Ingestor<NoValidator> {
    /// An ingestor that writes every fact; only [`EmitPolicy::All`] is accepted.
    pub fn without_validator(options: IngestOptions) -> Result<Self, IngestError> {
        Ingestor::new(options, None)
    }
}

impl<V: OriginValidator> Ingestor<V> {
    pub fn new(options: IngestOptions, validator: Option<V>) -> Result<Self, IngestError> {
        if options.emit_policy.needs_validator() && validator.is_none() {
            return Err(IngestError::MissingValidator(options.emit_policy));
        }
        Ok(Self { options, validator })
    }

    /// Consumes `queue` until the session is killed or the queue closes.
    ///
    /// The sink is flushed before returning.
    pub async fn run<W: AsyncWrite + Unpin>(
        &self,
        queue: &mut mpsc::Receiver<ServerMessage>,
        kill_switch: &KillSwitch,
        sink: &mut ResultWriter<W>,
    ) -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();

        while !kill_switch.killed() {
            let message = tokio::select! {
                biased;
                _ = kill_switch.dead() => break,
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => {
                        log::info!("Message queue closed, stopping ingestion.");
                        break;
                    }
                },
            };
            stats.messages += 1;
            self.handle_message(message, sink, &mut stats).await?;
        }

        sink.flush().await?;
        Ok(stats)
    }

    async fn handle_message<W: AsyncWrite + Unpin>(
        &self,
        message: ServerMessage,
        sink: &mut ResultWriter<W>,
        stats: &mut IngestStats,
    ) -> Result<(), IngestError> {
        match message {
            ServerMessage::Event(event) => self.handle_event(&event, sink, stats).await?,
            ServerMessage::Pong => {
                stats.pongs += 1;
                log::info!("Received pong from RIS Live");
            }
            ServerMessage::Error { message } => log::warn!("RIS Live reported an error: {}", message),
            ServerMessage::RrcList(hosts) => log::info!("RIS Live collectors: {}", hosts.join(", ")),
            ServerMessage::SubscribeOk => log::info!("Subscription acknowledged by RIS Live"),
            ServerMessage::Other(kind) => log::debug!("Ignoring RIS Live message of type '{}'", kind),
        }
        Ok(())
    }

    async fn handle_event<W: AsyncWrite + Unpin>(
        &self,
        event: &ServerEvent,
        sink: &mut ResultWriter<W>,
        stats: &mut IngestStats,
    ) -> Result<(), IngestError> {
        let Some(origin_asn) = event.origin_as() else {
            stats.skipped += 1;
            return Ok(());
        };

        for prefix in event.prefixes(self.options.only_ipv4) {
            let fact = Fact { origin_asn, prefix };
            match self.decide(&fact).await {
                Decision::Emit(verdict) => {
                    sink.write_fact(&fact, verdict).await?;
                    stats.emitted += 1;
                }
                Decision::Reject(verdict) => {
                    log::debug!("Dropping {} ({})", fact, verdict);
                    stats.rejected += 1;
                }
            }
        }
        Ok(())
    }

    async fn decide(&self, fact: &Fact) -> Decision {
        if self.options.emit_policy == EmitPolicy::All {
            return Decision::Emit(None);
        }

        let verdict = match &self.validator {
            Some(validator) => validator.validate(&fact.origin_asn.to_string(), &fact.prefix).await,
            None => Verdict::Unknown,
        };

        match (self.options.emit_policy, verdict) {
            (EmitPolicy::Annotate, verdict) => Decision::Emit(Some(verdict)),
            (_, Verdict::Valid) => Decision::Emit(None),
            (_, Verdict::Unknown) if self.options.unknown_policy == UnknownPolicy::Accept => Decision::Emit(None),
            (_, verdict) => Decision::Reject(verdict),
        }
    }
}
