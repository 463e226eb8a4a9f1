use std::marker::PhantomData;

use rusqlite::types::ValueRef;
use serde_json::Value;
use uuid::Uuid;

use crate::actor::{
    Actor, ActorFactoryArgs, ActorRef, ActorRefFactory, Context, Next, Sender,
};
use crate::Message;

/// One SQL statement routed through the connection pool.
///
/// The `id` correlates the reply: the pool round-robins queries over
/// its connections, so replies from different connections may
/// interleave.
#[derive(Clone, Debug)]
pub struct DbQuery {
    pub id: Uuid,
    pub sql: String,
    pub params: Vec<Value>,
}

impl DbQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> DbQuery {
        DbQuery {
            id: Uuid::new_v4(),
            sql: sql.into(),
            params,
        }
    }
}

/// Result rows (or the failure) for one query, keyed by its id.
#[derive(Clone, Debug)]
pub enum DbReply {
    Rows {
        id: Uuid,
        rows: Vec<Vec<Value>>,
    },
    Error {
        id: Uuid,
        error: String,
    },
}

/// Owns one SQLite connection, opened lazily on the first query.
///
/// Replies are wrapped in `W` so any actor whose message enum carries
/// a `From<DbReply>` conversion can be the sender.
pub struct ConnectionActor<W: Message + From<DbReply>> {
    db_path: String,
    conn: Option<rusqlite::Connection>,
    _marker: PhantomData<fn() -> W>,
}

impl<W: Message + From<DbReply>> ActorFactoryArgs<String> for ConnectionActor<W> {
    fn create_args(db_path: String) -> Self {
        ConnectionActor {
            db_path,
            conn: None,
            _marker: PhantomData,
        }
    }
}

impl<W: Message + From<DbReply>> ConnectionActor<W> {
    fn execute(&mut self, query: &DbQuery) -> DbReply {
        if self.conn.is_none() {
            match open_connection(&self.db_path) {
                Ok(c) => self.conn = Some(c),
                Err(e) => {
                    return DbReply::Error {
                        id: query.id,
                        error: e.to_string(),
                    }
                }
            }
        }
        let conn = self.conn.as_ref().expect("connection opened");

        match run_query(conn, query) {
            Ok(rows) => DbReply::Rows { id: query.id, rows },
            Err(e) => DbReply::Error {
                id: query.id,
                error: e.to_string(),
            },
        }
    }
}

fn open_connection(db_path: &str) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(db_path)?;
    // several pool connections share one file; WAL keeps readers off
    // the writers' lock and the busy timeout rides out short contention
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    Ok(conn)
}

fn run_query(
    conn: &rusqlite::Connection,
    query: &DbQuery,
) -> Result<Vec<Vec<Value>>, rusqlite::Error> {
    let mut stmt = conn.prepare(&query.sql)?;

    for (i, param) in query.params.iter().enumerate() {
        bind_param(&mut stmt, i + 1, param)?;
    }

    let column_count = stmt.column_count();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(column_value(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(out)
}

fn bind_param(
    stmt: &mut rusqlite::Statement,
    idx: usize,
    value: &Value,
) -> Result<(), rusqlite::Error> {
    match value {
        Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
        Value::Bool(b) => stmt.raw_bind_parameter(idx, *b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                stmt.raw_bind_parameter(idx, i)
            } else {
                stmt.raw_bind_parameter(idx, n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
        // structured payloads are stored as their JSON text
        other => stmt.raw_bind_parameter(idx, other.to_string()),
    }
}

fn column_value(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).to_string()),
    }
}

impl<W: Message + From<DbReply>> Actor for ConnectionActor<W> {
    type Msg = DbQuery;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        let reply = self.execute(&msg);
        if let Some(sender) = sender {
            let _ = sender.try_tell(W::from(reply), None);
        }
        Next::Same
    }
}

/// A fixed set of [`ConnectionActor`]s with round-robin routing.
///
/// The original sender rides along with each forwarded query, so
/// replies flow straight from the connection to the requester and
/// per-query ordering on a connection is preserved.
pub struct ConnectionPool<W: Message + From<DbReply>> {
    db_path: String,
    size: usize,
    connections: Vec<ActorRef<DbQuery>>,
    next: usize,
    _marker: PhantomData<fn() -> W>,
}

impl<W: Message + From<DbReply>> ActorFactoryArgs<(String, usize)> for ConnectionPool<W> {
    fn create_args((db_path, size): (String, usize)) -> Self {
        ConnectionPool {
            db_path,
            size: size.max(1),
            connections: Vec::new(),
            next: 0,
            _marker: PhantomData,
        }
    }
}

impl<W: Message + From<DbReply>> Actor for ConnectionPool<W> {
    type Msg = DbQuery;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        for i in 0..self.size {
            let name = format!("conn-{}", i);
            if let Ok(conn) = ctx
                .actor_of_args::<ConnectionActor<W>, _>(&name, self.db_path.clone())
            {
                self.connections.push(conn);
            }
        }
    }

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        if self.connections.is_empty() {
            return Next::Unhandled;
        }

        let conn = &self.connections[self.next % self.connections.len()];
        self.next = (self.next + 1) % self.connections.len();
        conn.tell_from(msg, sender);
        Next::Same
    }
}
