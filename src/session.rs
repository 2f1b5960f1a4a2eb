//! The protocol state machine: connects, authenticates, selects a mailbox,
//! fetches what's missing, and always attempts a clean logout.

use log::{debug, info, warn};

use crate::authfile::Credentials;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::{self, Greeting, Status};
use crate::reader;
use crate::store::{Fullness, LocalStore, Reconciliation};
use crate::transport::Io;

/// Session state, mirroring spec.md §4.5's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Authenticated,
    MailboxSelected,
    LoggedOut,
}

/// Summary of a completed run, used to build the user-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub downloaded: usize,
    pub already_present: usize,
    pub only_new: bool,
    pub headers_only: bool,
}

impl RunSummary {
    /// The single textual summary line emitted after a successful fetch.
    pub fn describe(&self, mailbox: &str) -> String {
        let headers_suffix = if self.headers_only { " (headers only)" } else { "" };
        let scope = if self.only_new { "new " } else { "" };

        let mut line = if self.downloaded == 0 {
            format!("No {scope}messages downloaded from {mailbox}{headers_suffix}.")
        } else {
            format!(
                "Downloaded {} {scope}message{} from {mailbox}{headers_suffix}.",
                self.downloaded,
                if self.downloaded == 1 { "" } else { "s" }
            )
        };

        if self.already_present > 0 {
            line.push_str(&format!(
                " {} message{} already present.",
                self.already_present,
                if self.already_present == 1 { "" } else { "s" }
            ));
        }

        line
    }
}

/// Drives one complete session over an already-abstracted transport.
pub struct Session<T: Io> {
    transport: T,
    tag_counter: u64,
    state: State,
}

impl<T: Io> Session<T> {
    pub fn new(transport: T) -> Session<T> {
        Session {
            transport,
            tag_counter: 1,
            state: State::Connected,
        }
    }

    fn next_tag(&mut self) -> String {
        let tag = format!("A{}", self.tag_counter);
        self.tag_counter += 1;
        tag
    }

    fn send_command(&mut self, verb_and_args: &str) -> Result<Vec<u8>> {
        let tag = self.next_tag();
        let line = format!("{tag} {verb_and_args}\r\n");
        debug!("-> {line:?}");
        self.transport.write_all(line.as_bytes())?;
        let response = reader::read_response(&mut self.transport, &tag)?;
        debug!("<- {:?}", String::from_utf8_lossy(&response));
        Ok(response)
    }

    fn best_effort_logout(&mut self) {
        if self.state == State::LoggedOut {
            return;
        }
        let tag = self.next_tag();
        let line = format!("{tag} LOGOUT\r\n");
        if self.transport.write_all(line.as_bytes()).is_ok() {
            let _ = reader::read_response(&mut self.transport, &tag);
        }
        self.transport.close();
        self.state = State::LoggedOut;
    }

    /// Run the full session: greet, authenticate, select, reconcile, fetch,
    /// logout. On any error, a best-effort LOGOUT is still attempted before
    /// the error is returned.
    pub fn run(
        mut self,
        config: &Config,
        credentials: &Credentials,
        store: &LocalStore,
    ) -> Result<RunSummary> {
        let result = self.run_inner(config, credentials, store);
        if result.is_err() {
            self.best_effort_logout();
        }
        result
    }

    fn run_inner(
        &mut self,
        config: &Config,
        credentials: &Credentials,
        store: &LocalStore,
    ) -> Result<RunSummary> {
        let greeting_response = reader::read_greeting(&mut self.transport)?;
        let greeting = parser::classify_greeting(&greeting_response)?;
        info!("connected to {}", config.server);

        match greeting {
            Greeting::Bye => {
                return Err(Error::Protocol(
                    "server sent BYE in its greeting".to_string(),
                ));
            }
            Greeting::PreAuth => {
                self.state = State::Authenticated;
            }
            Greeting::Ok => {
                self.login(credentials)?;
                self.state = State::Authenticated;
            }
        }

        let uidvalidity = self.select_mailbox(&config.mailbox)?;
        self.state = State::MailboxSelected;

        let reconciliation =
            store.reconcile(&credentials.username, &config.mailbox, uidvalidity)?;
        match reconciliation {
            Reconciliation::Created => info!("created local mirror for {}", config.mailbox),
            Reconciliation::Updated => {
                warn!("UIDVALIDITY changed for {}; purged stale messages", config.mailbox)
            }
            Reconciliation::Unchanged => debug!("UIDVALIDITY unchanged for {}", config.mailbox),
        }

        let summary = self.fetch_messages(config, credentials, store)?;
        self.best_effort_logout();
        Ok(summary)
    }

    fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let tag_for_status = format!("A{}", self.tag_counter);
        let response = self.send_command(&format!(
            "LOGIN {} {}",
            credentials.username, credentials.password
        ))?;
        match parser::parse_status(&response, &tag_for_status)? {
            Status::Ok(_) => Ok(()),
            Status::No(info) | Status::Bad(info) => Err(Error::Auth(info)),
        }
    }

    fn select_mailbox(&mut self, mailbox: &str) -> Result<u32> {
        let tag_for_status = format!("A{}", self.tag_counter);
        let response = self.send_command(&format!("SELECT {mailbox}"))?;
        match parser::parse_status(&response, &tag_for_status)? {
            Status::Ok(_) => parser::extract_uidvalidity(&response),
            Status::No(info) | Status::Bad(info) => Err(Error::Select(info)),
        }
    }

    fn fetch_messages(
        &mut self,
        config: &Config,
        credentials: &Credentials,
        store: &LocalStore,
    ) -> Result<RunSummary> {
        let tag_for_status = format!("A{}", self.tag_counter);
        let search_verb = if config.only_new { "UID SEARCH NEW" } else { "UID SEARCH ALL" };
        let response = self.send_command(search_verb)?;
        match parser::parse_status(&response, &tag_for_status)? {
            Status::No(info) | Status::Bad(info) => return Err(Error::Fetch(info)),
            Status::Ok(_) => {}
        }
        let uids = parser::parse_search(&response);

        let mut downloaded = 0usize;
        let mut already_present = 0usize;

        for uid in uids {
            let fullness = store.classify(uid, &credentials.username, &config.mailbox)?;
            let skip = match fullness {
                Fullness::Full => true,
                Fullness::HeadersOnly => config.headers_only,
                Fullness::Absent => false,
            };
            if skip {
                already_present += 1;
                continue;
            }

            let body = self.fetch_one(uid, config.headers_only)?;
            store.save(&body, uid, &credentials.username, &config.mailbox)?;
            downloaded += 1;
        }

        Ok(RunSummary {
            downloaded,
            already_present,
            only_new: config.only_new,
            headers_only: config.headers_only,
        })
    }

    /// Fetch a single UID, with one retry on a transient transport error.
    fn fetch_one(&mut self, uid: u32, headers_only: bool) -> Result<Vec<u8>> {
        let section = if headers_only { "BODY[HEADER]" } else { "BODY[]" };
        match self.fetch_attempt(uid, section) {
            Ok(body) => Ok(body),
            Err(Error::Transport(_)) | Err(Error::Timeout) => {
                warn!("transient failure fetching UID {uid}, retrying once");
                self.fetch_attempt(uid, section)
            }
            Err(e) => Err(e),
        }
    }

    fn fetch_attempt(&mut self, uid: u32, section: &str) -> Result<Vec<u8>> {
        let tag_for_status = format!("A{}", self.tag_counter);
        let response = self.send_command(&format!("UID FETCH {uid} {section}"))?;
        match parser::parse_status(&response, &tag_for_status)? {
            Status::No(info) | Status::Bad(info) => Err(Error::Fetch(info)),
            Status::Ok(_) => parser::parse_fetch_body(&response),
        }
    }
}
