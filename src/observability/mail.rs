//! Mail alert sink
//!
//! A `tracing` layer that hands each record it sees to a background thread,
//! which sends it as a plain-text mail over SMTP. The queue is bounded;
//! records arriving while it is full are counted and dropped so logging
//! never blocks on the mail server.

use super::LoggingError;
use crate::config::settings::MailSink;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Message, SmtpTransport, Transport};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

pub const DEFAULT_SMTP_PORT: u16 = 25;
pub const DEFAULT_SUBJECT: &str = "Application log alert";
/// Records waiting for the mail thread before new ones are dropped
pub const MAIL_QUEUE_CAPACITY: usize = 256;
/// How long dropping the worker waits for queued alerts to go out
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One log record queued for mailing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl MailRecord {
    pub fn body(&self) -> String {
        format!("{} {}: {}\n", self.level, self.target, self.message)
    }
}

/// Splits `host[:port]`, falling back to port 25.
pub fn split_host_port(host: &str) -> (&str, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() => match port.parse() {
            Ok(port) => (name, port),
            Err(_) => (host, DEFAULT_SMTP_PORT),
        },
        _ => (host, DEFAULT_SMTP_PORT),
    }
}

fn mailbox(address: &str) -> Result<Mailbox, LoggingError> {
    address
        .parse()
        .map_err(|source| LoggingError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

/// SMTP client plus the fixed envelope of every alert
pub struct Mailer {
    transport: SmtpTransport,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
}

impl Mailer {
    /// Unset sender defaults to `logging@<server>`, unset subject to
    /// [`DEFAULT_SUBJECT`].
    pub fn from_sink(sink: &MailSink<'_>) -> Result<Self, LoggingError> {
        let (server, port) = split_host_port(sink.host);
        let from = match sink.from_address {
            Some(address) => mailbox(address)?,
            None => mailbox(&format!("logging@{server}"))
                .or_else(|_| mailbox("logging@localhost"))?,
        };
        let to = sink
            .to_addresses
            .iter()
            .map(|a| mailbox(a))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            transport: SmtpTransport::builder_dangerous(server).port(port).build(),
            from,
            to,
            subject: sink.subject.unwrap_or(DEFAULT_SUBJECT).to_string(),
        })
    }

    pub fn message(&self, record: &MailRecord) -> Result<Message, lettre::error::Error> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.subject.clone());
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder.header(ContentType::TEXT_PLAIN).body(record.body())
    }

    pub fn send(&self, record: &MailRecord) -> Result<(), String> {
        let message = self.message(record).map_err(|e| e.to_string())?;
        self.transport.send(&message).map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Delivery function for [`MailWorker::spawn`]; failures go to stderr.
    pub fn into_delivery(self) -> impl FnMut(MailRecord) + Send + 'static {
        move |record| {
            if let Err(e) = self.send(&record) {
                // tracing here would feed back into this sink
                eprintln!("log mail to {} recipient(s) failed: {e}", self.to.len());
            }
        }
    }
}

/// Message on the mail queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailCommand {
    Record(MailRecord),
    /// Sent once when the worker is dropped; records queued before it are
    /// still delivered.
    Shutdown,
}

/// Background thread delivering queued records.
///
/// Dropping the worker asks the thread to finish the queue and waits up to
/// [`SHUTDOWN_TIMEOUT`] for it. A thread still busy after that is left
/// detached.
pub struct MailWorker {
    sender: SyncSender<MailCommand>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    dropped: Arc<AtomicUsize>,
}

impl MailWorker {
    pub fn spawn<F>(deliver: F) -> Result<Self, LoggingError>
    where
        F: FnMut(MailRecord) + Send + 'static,
    {
        Self::with_capacity(MAIL_QUEUE_CAPACITY, deliver)
    }

    pub fn with_capacity<F>(capacity: usize, mut deliver: F) -> Result<Self, LoggingError>
    where
        F: FnMut(MailRecord) + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let (done_sender, done) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("log-mailer".into())
            .spawn(move || {
                for command in receiver {
                    match command {
                        MailCommand::Record(record) => deliver(record),
                        MailCommand::Shutdown => break,
                    }
                }
                let _ = done_sender.send(());
            })
            .map_err(LoggingError::MailWorker)?;

        Ok(Self {
            sender,
            done,
            handle: Some(handle),
            dropped: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A layer feeding this worker's queue
    pub fn layer(&self) -> MailLayer {
        MailLayer::new(self.sender.clone(), Arc::clone(&self.dropped))
    }

    /// Records discarded because the queue was full
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops the thread after the queue drains. Returns `false` when it did
    /// not finish within `timeout`.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.finish(timeout)
    }

    fn finish(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;

        let mut command = MailCommand::Shutdown;
        loop {
            match self.sender.try_send(command) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => break,
                Err(TrySendError::Full(pending)) => {
                    if Instant::now() >= deadline {
                        eprintln!("log mail queue still full at shutdown, alerts may be lost");
                        return false;
                    }
                    command = pending;
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        match self.done.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                eprintln!("log mail thread did not finish in {timeout:?}, alerts may be lost");
                false
            }
        }
    }
}

impl Drop for MailWorker {
    fn drop(&mut self) {
        self.finish(SHUTDOWN_TIMEOUT);
    }
}

/// Layer queuing every record it is handed; filter it by the mail level
pub struct MailLayer {
    sender: SyncSender<MailCommand>,
    dropped: Arc<AtomicUsize>,
}

impl MailLayer {
    pub fn new(sender: SyncSender<MailCommand>, dropped: Arc<AtomicUsize>) -> Self {
        Self { sender, dropped }
    }
}

impl<S: Subscriber> Layer<S> for MailLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let record = MailRecord {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        };
        if let Err(TrySendError::Full(_)) = self.sender.try_send(MailCommand::Record(record)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }
}
