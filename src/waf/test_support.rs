//! Scripted engine for unit tests: blocks or fails at a chosen phase and
//! records every call it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::engine::{
    Action, BodyWrite, EngineError, InspectionEngine, Interruption, Transaction,
};
use crate::waf::transaction::Phase;

#[derive(Clone)]
pub struct ScriptedEngine {
    pub block_at: Option<(Phase, u16)>,
    pub fail_at: Option<Phase>,
    pub request_body_limit: usize,
    pub response_accessible: bool,
    pub response_processable: bool,
    pub engine_off: bool,
    pub log: Arc<Mutex<Vec<String>>>,
    pub(crate) closed: Arc<AtomicUsize>,
    pub(crate) logged: Arc<AtomicUsize>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            block_at: None,
            fail_at: None,
            request_body_limit: usize::MAX,
            response_accessible: true,
            response_processable: true,
            engine_off: false,
            log: Arc::default(),
            closed: Arc::default(),
            logged: Arc::default(),
        }
    }
}

impl ScriptedEngine {
    pub fn blocking_at(phase: Phase, status: u16) -> Self {
        Self {
            block_at: Some((phase, status)),
            ..Self::default()
        }
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn logged(&self) -> usize {
        self.logged.load(Ordering::SeqCst)
    }
}

impl InspectionEngine for ScriptedEngine {
    fn new_transaction(&self) -> Box<dyn Transaction> {
        Box::new(ScriptedTransaction {
            script: self.clone(),
            request_body: BytesMut::new(),
            response_body: BytesMut::new(),
            interruption: None,
        })
    }
}

struct ScriptedTransaction {
    script: ScriptedEngine,
    request_body: BytesMut,
    response_body: BytesMut,
    interruption: Option<Interruption>,
}

impl ScriptedTransaction {
    fn record(&self, line: String) {
        self.script.log.lock().unwrap().push(line);
    }

    fn verdict(&mut self, phase: Phase) -> Option<Interruption> {
        if self.interruption.is_some() {
            return self.interruption.clone();
        }
        match self.script.block_at {
            Some((at, status)) if at == phase => {
                let it = Interruption {
                    rule_id: 1000,
                    status,
                    action: Action::Deny,
                    data: format!("scripted block at {phase}"),
                };
                self.interruption = Some(it.clone());
                Some(it)
            }
            _ => None,
        }
    }

    fn fail(&self, phase: Phase) -> Result<(), EngineError> {
        if self.script.fail_at == Some(phase) {
            Err(EngineError::Buffer(format!("scripted failure at {phase}")))
        } else {
            Ok(())
        }
    }
}

impl Transaction for ScriptedTransaction {
    fn id(&self) -> &str {
        "scripted"
    }

    fn process_connection(
        &mut self,
        client_ip: &str,
        client_port: u16,
        server_host: &str,
        server_port: u16,
    ) -> Option<Interruption> {
        self.record(format!(
            "connection {client_ip} {client_port} {server_host} {server_port}"
        ));
        self.verdict(Phase::Connection)
    }

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) {
        self.record(format!("uri {uri} {method} {protocol}"));
    }

    fn set_server_name(&mut self, host: &str) {
        self.record(format!("server_name {host}"));
    }

    fn add_request_header(&mut self, name: &str, value: &str) {
        self.record(format!("header {name}: {value}"));
    }

    fn process_request_headers(&mut self) -> Option<Interruption> {
        self.record("request_headers".into());
        self.verdict(Phase::RequestHeaders)
    }

    fn is_request_body_accessible(&self) -> bool {
        true
    }

    fn write_request_body(&mut self, data: &[u8]) -> Result<BodyWrite, EngineError> {
        self.fail(Phase::RequestBody)?;
        let room = self
            .script
            .request_body_limit
            .saturating_sub(self.request_body.len());
        let accepted = room.min(data.len());
        self.request_body.extend_from_slice(&data[..accepted]);
        Ok(BodyWrite {
            interruption: None,
            accepted,
        })
    }

    fn request_body_reader(&mut self) -> Result<Bytes, EngineError> {
        Ok(self.request_body.clone().freeze())
    }

    fn process_request_body(&mut self) -> Result<Option<Interruption>, EngineError> {
        self.record("request_body".into());
        Ok(self.verdict(Phase::RequestBody))
    }

    fn add_response_header(&mut self, name: &str, value: &str) {
        self.record(format!("response_header {name}: {value}"));
    }

    fn process_response_headers(&mut self, status: u16, _protocol: &str) -> Option<Interruption> {
        self.record(format!("response_headers {status}"));
        self.verdict(Phase::ResponseHeaders)
    }

    fn is_response_body_accessible(&self) -> bool {
        self.script.response_accessible
    }

    fn is_response_body_processable(&self) -> bool {
        self.script.response_processable
    }

    fn write_response_body(&mut self, data: &[u8]) -> Result<BodyWrite, EngineError> {
        if let Some(it) = &self.interruption {
            return Ok(BodyWrite {
                interruption: Some(it.clone()),
                accepted: 0,
            });
        }
        self.response_body.extend_from_slice(data);
        Ok(BodyWrite {
            interruption: None,
            accepted: data.len(),
        })
    }

    fn process_response_body(&mut self) -> Result<Option<Interruption>, EngineError> {
        self.record("response_body".into());
        self.fail(Phase::ResponseBody)?;
        Ok(self.verdict(Phase::ResponseBody))
    }

    fn response_body_reader(&mut self) -> Result<Bytes, EngineError> {
        Ok(self.response_body.clone().freeze())
    }

    fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    fn is_rule_engine_off(&self) -> bool {
        self.script.engine_off
    }

    fn process_logging(&mut self) {
        self.script.logged.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
