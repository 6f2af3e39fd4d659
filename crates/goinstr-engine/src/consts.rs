//! Import paths, symbol names and advisory texts used in generated code.

pub const DEFAULT_AGENT_VARIABLE: &str = "NewRelicAgent";
pub const DEFAULT_DIFF_FILE: &str = "new-relic-instrumentation.diff";
pub const DEFAULT_TXN_VARIABLE: &str = "nrTxn";
pub const EXTERNAL_SEGMENT_VARIABLE: &str = "externalSegment";
pub const SHUTDOWN_SECONDS: &str = "5";

pub const NEWRELIC: &str = "github.com/newrelic/go-agent/v3/newrelic";
pub const NRGIN: &str = "github.com/newrelic/go-agent/v3/integrations/nrgin";
pub const NRGORILLA: &str = "github.com/newrelic/go-agent/v3/integrations/nrgorilla";
pub const NRGRPC: &str = "github.com/newrelic/go-agent/v3/integrations/nrgrpc";
pub const NRSLOG: &str = "github.com/newrelic/go-agent/v3/integrations/logcontext-v2/nrslog";

pub const CONTEXT: &str = "context";
pub const DATABASE_SQL: &str = "database/sql";
pub const NET_HTTP: &str = "net/http";
pub const LOG_SLOG: &str = "log/slog";
pub const TIME: &str = "time";
pub const GIN: &str = "github.com/gin-gonic/gin";
pub const GORILLA_MUX: &str = "github.com/gorilla/mux";
pub const GRPC: &str = "google.golang.org/grpc";

/// Package names the generated code refers to, keyed by import path.
pub const PACKAGE_NAMES: &[(&str, &str)] = &[
    (NEWRELIC, "newrelic"),
    (NRGIN, "nrgin"),
    (NRGORILLA, "nrgorilla"),
    (NRGRPC, "nrgrpc"),
    (NRSLOG, "nrslog"),
    (CONTEXT, "context"),
    (TIME, "time"),
];

/// Name generated code uses for `path`.
pub fn package_name(path: &str) -> &str {
    PACKAGE_NAMES
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, name)| *name)
        .unwrap_or(path)
}

mod urls {
    pub const ERRORS: &str =
        "https://docs.newrelic.com/docs/apm/agents/go-agent/instrumentation/instrument-go-errors/";
    pub const GOROUTINES: &str = "https://docs.newrelic.com/docs/apm/agents/go-agent/instrumentation/instrument-go-transactions/#goroutines";
    pub const TRANSACTIONS: &str =
        "https://docs.newrelic.com/docs/apm/agents/go-agent/instrumentation/instrument-go-transactions/";
    pub const EXTERNAL_SEGMENTS: &str = "https://docs.newrelic.com/docs/apm/agents/go-agent/instrumentation/instrument-go-segments/#external-segments";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Warning,
    Info,
}

/// A comment block attached above a statement the engine could not safely
/// rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advisory {
    pub level: Level,
    pub message: &'static str,
    pub url: &'static str,
}

impl Advisory {
    /// The comment lines, first the tagged message, then the link.
    pub fn lines(&self) -> Vec<String> {
        let tag = match self.level {
            Level::Warning => "NR-WARNING",
            Level::Info => "NR-INFO",
        };
        vec![format!("// {tag}: {}", self.message), format!("// {}", self.url)]
    }
}

pub const UNCHECKED_ERROR: Advisory = Advisory {
    level: Level::Warning,
    message: "The error returned here is discarded, so it will not be reported to New Relic.",
    url: urls::ERRORS,
};

pub const SUSPECT_EXPECTED_ERROR: Advisory = Advisory {
    level: Level::Warning,
    message: "This check may treat an expected error as success; report unexpected values with txn.NoticeError.",
    url: urls::ERRORS,
};

pub const UNKNOWN_ERROR: Advisory = Advisory {
    level: Level::Warning,
    message: "Errors handled by this switch are not captured automatically; call txn.NoticeError in the relevant cases.",
    url: urls::ERRORS,
};

pub const GOROUTINE_IN_MAIN: Advisory = Advisory {
    level: Level::Info,
    message: "Goroutines started in main are not instrumented automatically; pass them a transaction with txn.NewGoroutine().",
    url: urls::GOROUTINES,
};

pub const ANONYMOUS_HANDLER: Advisory = Advisory {
    level: Level::Info,
    message: "The body of this anonymous handler is not traced; move it into a named function to instrument it.",
    url: urls::TRANSACTIONS,
};

pub const CONTEXT_WRAPPED: Advisory = Advisory {
    level: Level::Info,
    message: "This context did not carry the current transaction, so it was wrapped with one.",
    url: urls::TRANSACTIONS,
};

/// Prepended to calls of the `net/http` package helpers, which send requests
/// through the default client without a request the agent can observe.
pub const HTTP_HELPER: Advisory = Advisory {
    level: Level::Warning,
    message: "Requests sent with net/http helper functions cannot be instrumented; build one with http.NewRequest and send it with a client's Do method.",
    url: urls::EXTERNAL_SEGMENTS,
};

/// Outbound helpers of `net/http` that bypass an observable request.
pub const HTTP_HELPERS: &[&str] = &["Get", "Post", "Head", "PostForm"];
