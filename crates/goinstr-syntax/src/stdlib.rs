//! Declarations of the standard-library and framework packages the type
//! resolver knows about.
//!
//! Each entry is a Go source stub holding only declarations (functions
//! without bodies, types, package variables). Stubs are parsed with the same
//! front end as application code and checked like any other package.

/// `(import path, stub source)` pairs.
pub const KNOWN_PACKAGES: &[(&str, &str)] = &[
    ("context", include_str!("../stubs/context.go")),
    ("database/sql", include_str!("../stubs/database_sql.go")),
    ("encoding/json", include_str!("../stubs/encoding_json.go")),
    ("errors", include_str!("../stubs/errors.go")),
    ("fmt", include_str!("../stubs/fmt.go")),
    ("io", include_str!("../stubs/io.go")),
    ("log", include_str!("../stubs/log.go")),
    ("log/slog", include_str!("../stubs/log_slog.go")),
    ("net/http", include_str!("../stubs/net_http.go")),
    ("os", include_str!("../stubs/os.go")),
    ("strconv", include_str!("../stubs/strconv.go")),
    ("time", include_str!("../stubs/time.go")),
    ("github.com/gin-gonic/gin", include_str!("../stubs/gin.go")),
    ("github.com/gorilla/mux", include_str!("../stubs/gorilla_mux.go")),
    ("google.golang.org/grpc", include_str!("../stubs/grpc.go")),
    (
        "github.com/newrelic/go-agent/v3/newrelic",
        include_str!("../stubs/newrelic.go"),
    ),
];

/// Predeclared type names.
pub const PREDECLARED_TYPES: &[&str] = &[
    "any",
    "bool",
    "byte",
    "comparable",
    "complex64",
    "complex128",
    "error",
    "float32",
    "float64",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "rune",
    "string",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
];

/// Predeclared functions.
pub const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];

/// Predeclared constants and the zero value `nil`.
pub const PREDECLARED_CONSTS: &[&str] = &["true", "false", "iota", "nil"];
