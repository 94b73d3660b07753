//! Scripted connection shared by the integration tests.

use relmap::{Connection, Result, Row, Value};
use std::sync::{Arc, Mutex};

pub struct Response {
    pub needle: &'static str,
    pub params: Option<Vec<Value>>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Default)]
pub struct ScriptState {
    pub responses: Vec<Response>,
    pub query_calls: usize,
    pub queries: Vec<(String, Vec<Value>)>,
}

/// Connection that answers queries from a script.
///
/// Responses match on a SQL substring and, optionally, exact parameters;
/// anything unmatched yields zero rows. Every call is recorded.
pub struct ScriptedConnection {
    pub state: Mutex<ScriptState>,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptState::default()),
        })
    }

    pub fn respond(
        &self,
        needle: &'static str,
        params: Option<Vec<Value>>,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) {
        self.state
            .lock()
            .expect("lock poisoned")
            .responses
            .push(Response {
                needle,
                params,
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                rows,
            });
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().expect("lock poisoned").query_calls
    }

    pub fn queries(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").queries.clone()
    }
}

impl Connection for ScriptedConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.query_calls += 1;
        state.queries.push((sql.to_string(), params.to_vec()));
        for response in &state.responses {
            let params_match = response
                .params
                .as_ref()
                .is_none_or(|expected| expected.as_slice() == params);
            if sql.contains(response.needle) && params_match {
                return Ok(response
                    .rows
                    .iter()
                    .map(|values| Row::new(response.columns.clone(), values.clone()))
                    .collect());
            }
        }
        Ok(Vec::new())
    }

    fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
        Ok(0)
    }
}
