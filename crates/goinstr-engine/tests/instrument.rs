use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use goinstr_engine::{Error, InstrumentOptions, NoopResolver, Report, instrument};
use insta::assert_snapshot;

const GO_MOD: &str = "module example.com/shop\n\ngo 1.22\n";

const TRACED_MAIN: &str = r#"package main

import "fmt"

func work(n int) int {
	fmt.Println(n)
	return n
}

func main() {
	work(1)
}
"#;

const HANDLER: &str = r#"package main

import (
	"fmt"
	"net/http"
)

func render(w http.ResponseWriter) {
	fmt.Fprintln(w, "hello")
}

func index(w http.ResponseWriter, r *http.Request) {
	render(w)
}

func main() {
	http.HandleFunc("/", index)
	http.ListenAndServe(":8080", nil)
}
"#;

const ERRORS: &str = r#"package main

import (
	"errors"
	"fmt"
)

func load(id int) (string, error) {
	if id < 0 {
		return "", errors.New("bad id")
	}
	return fmt.Sprint(id), nil
}

func run() {
	name, err := load(1)
	if err != nil {
		fmt.Println(err)
		return
	}
	fmt.Println(name)
	_, _ = load(2)
}

func main() {
	run()
}
"#;

const GOROUTINES: &str = r#"package main

import "fmt"

func worker(id int) {
	fmt.Println(id)
}

func start() {
	go worker(1)
	go func() {
		fmt.Println("literal")
	}()
}

func main() {
	start()
	go worker(2)
}
"#;

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn app(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::Builder::new().prefix("goinstr").tempdir().unwrap();
    write(dir.path(), "go.mod", GO_MOD);
    for (rel, text) in files {
        write(dir.path(), rel, text);
    }
    dir
}

fn instrument_dir(root: &Path, app_name: &str) -> (String, Report) {
    let mut options = InstrumentOptions::new(root);
    options.app_name = app_name.to_string();
    let mut out = Vec::new();
    let report = instrument(&options, &NoopResolver, &mut out).unwrap();
    (String::from_utf8(out).unwrap(), report)
}

struct Run {
    dir: tempfile::TempDir,
    diff: String,
    report: Report,
}

impl Run {
    /// Every patched file, in path order, as it reads once the patch is
    /// applied.
    fn patched(&self) -> String {
        let mut out = String::new();
        for (name, text) in apply(self.dir.path(), &self.diff) {
            out.push_str(&format!("=== {name}\n"));
            out.push_str(&text);
        }
        out
    }
}

fn run(files: &[(&str, &str)], app_name: &str) -> Run {
    let dir = app(files);
    let (diff, report) = instrument_dir(dir.path(), app_name);
    Run { dir, diff, report }
}

/// `a,b` or `a` from a hunk header, as start line and length.
fn hunk_range(range: &str) -> (usize, usize) {
    let range = range.trim_start_matches(['-', '+']);
    match range.split_once(',') {
        Some((start, len)) => (start.parse().unwrap(), len.parse().unwrap()),
        None => (range.parse().unwrap(), 1),
    }
}

/// Files touched by `diff`, keyed by their name in the patch headers, with
/// the patch applied to their contents under `root`.
fn apply(root: &Path, diff: &str) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut lines = diff.lines().peekable();
    while let Some(line) = lines.next() {
        let Some(name) = line.strip_prefix("--- a/") else {
            continue;
        };
        assert!(lines.next().is_some_and(|l| l.starts_with("+++ b/")));
        let original = fs::read_to_string(root.join(name)).unwrap();
        let old: Vec<&str> = original.lines().collect();
        let mut new: Vec<&str> = Vec::new();
        let mut at = 0;
        while let Some(header) = lines.peek().copied().and_then(|l| l.strip_prefix("@@ ")) {
            lines.next();
            let mut ranges = header.split(' ');
            let (old_start, old_len) = hunk_range(ranges.next().unwrap());
            let (_, new_len) = hunk_range(ranges.next().unwrap());
            let from = if old_len == 0 { old_start } else { old_start - 1 };
            new.extend(&old[at..from]);
            at = from;
            let (mut old_seen, mut new_seen) = (0, 0);
            while old_seen < old_len || new_seen < new_len {
                let line = lines.next().unwrap();
                if line.starts_with('\\') {
                    continue;
                }
                match line.chars().next() {
                    Some('-') => {
                        at += 1;
                        old_seen += 1;
                    }
                    Some('+') => {
                        new.push(&line[1..]);
                        new_seen += 1;
                    }
                    _ => {
                        new.push(old[at]);
                        at += 1;
                        old_seen += 1;
                        new_seen += 1;
                    }
                }
            }
        }
        new.extend(&old[at..]);
        let mut text = new.join("\n");
        text.push('\n');
        files.insert(name.to_string(), text);
    }
    files
}

#[test]
fn test_main_calls_are_traced() {
    let run = run(&[("main.go", TRACED_MAIN)], "shop");
    assert_eq!(run.report.files_patched, 1);
    assert!(run.diff.starts_with("--- a/main.go\n+++ b/main.go\n"));
    assert!(run.report.imports.iter().any(|i| i.path == "time"));
    assert_snapshot!("main_calls_are_traced", run.patched());
}

#[test]
fn test_http_handler_reads_request_transaction() {
    let run = run(&[("main.go", HANDLER)], "");
    assert!(!run.diff.contains("StartTransaction(\"render\")"));
    assert_snapshot!("http_handler", run.patched());
}

#[test]
fn test_errors_are_noticed() {
    let run = run(&[("main.go", ERRORS)], "");
    assert_snapshot!("errors_are_noticed", run.patched());
}

#[test]
fn test_goroutines_get_their_own_transaction() {
    let run = run(&[("main.go", GOROUTINES)], "");
    // The goroutine started in main is untraced and only keeps compiling.
    assert_eq!(run.report.call_sites_fixed, 1);
    assert_snapshot!("goroutines", run.patched());
}

#[test]
fn test_router_gets_middleware() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import "github.com/gin-gonic/gin"

func main() {
	router := gin.Default()
	router.Run(":8080")
}
"#,
        )],
        "",
    );
    assert!(run
        .report
        .imports
        .iter()
        .any(|i| i.path == "github.com/newrelic/go-agent/v3/integrations/nrgin"));
    assert_snapshot!("router_middleware", run.patched());
}

#[test]
fn test_first_query_runs_in_a_transaction() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import (
	"database/sql"
	"fmt"
)

func main() {
	db, err := sql.Open("mysql", "dsn")
	if err != nil {
		panic(err)
	}
	row := db.QueryRow("SELECT 1")
	var n int
	row.Scan(&n)
	fmt.Println(n)
}
"#,
        )],
        "",
    );
    assert_snapshot!("first_query", run.patched());
}

#[test]
fn test_default_client_requests_get_external_segments() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import (
	"fmt"
	"net/http"
)

func fetch(url string) {
	req, err := http.NewRequest("GET", url, nil)
	if err != nil {
		return
	}
	resp, err := http.DefaultClient.Do(req)
	if err != nil {
		return
	}
	fmt.Println(resp.StatusCode)
}

func ping(url string) error {
	_, err := http.Get(url)
	return err
}

func main() {
	fetch("http://example.com")
}
"#,
        )],
        "",
    );
    assert_snapshot!("default_client", run.patched());
}

#[test]
fn test_clients_carry_the_transaction() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import (
	"fmt"
	"net/http"
)

func download(url string) {
	client := &http.Client{}
	req, _ := http.NewRequest("GET", url, nil)
	resp, err := client.Do(req)
	if err != nil {
		return
	}
	fmt.Println(resp.Status)
}

func main() {
	download("http://example.com")
}
"#,
        )],
        "",
    );
    assert_snapshot!("client_requests", run.patched());
}

#[test]
fn test_log_handlers_are_wrapped() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import (
	"log/slog"
	"os"
)

func main() {
	handler := slog.NewTextHandler(os.Stdout, nil)
	logger := slog.New(handler)
	logger.Info("starting")
	audit := slog.New(slog.NewJSONHandler(os.Stderr, nil))
	audit.Info("ready")
}
"#,
        )],
        "",
    );
    assert!(run
        .report
        .imports
        .iter()
        .any(|i| i.path == "github.com/newrelic/go-agent/v3/integrations/logcontext-v2/nrslog"));
    assert_snapshot!("slog_handlers", run.patched());
}

#[test]
fn test_grpc_client_and_streaming_server() {
    let run = run(
        &[
            (
                "pb/guide_grpc.pb.go",
                r#"// Code generated by protoc-gen-go-grpc. DO NOT EDIT.

package pb

import "google.golang.org/grpc"

type Feature struct {
	Name string
}

type Guide_ListServer = grpc.ServerStreamingServer[Feature]

func RegisterGuideServer(s *grpc.Server, srv any) {}
"#,
            ),
            (
                "main.go",
                r#"package main

import (
	"fmt"

	"example.com/shop/pb"
	"google.golang.org/grpc"
)

type guideServer struct{}

func (s *guideServer) List(name string, stream pb.Guide_ListServer) error {
	return stream.Send(lookup(name))
}

func lookup(name string) *pb.Feature {
	fmt.Println(name)
	return &pb.Feature{Name: name}
}

func main() {
	conn, err := grpc.Dial(
		"localhost:50051",
		grpc.WithInsecure(),
	)
	if err != nil {
		panic(err)
	}
	defer conn.Close()

	s := grpc.NewServer()
	pb.RegisterGuideServer(s, &guideServer{})
	s.Serve(nil)
}
"#,
            ),
        ],
        "",
    );
    assert_eq!(run.report.files_patched, 1);
    assert!(!run.diff.contains("guide_grpc.pb.go"));
    assert!(run.report.instrumented.contains(&"example.com/shop.guideServer.List".to_string()));
    assert_snapshot!("grpc_client_and_server", run.patched());
}

#[test]
fn test_generated_code_and_its_callees_are_untouched() {
    let run = run(
        &[
            (
                "wire_gen.go",
                r#"// Code generated by Wire. DO NOT EDIT.

package main

func build() int {
	return NewStore()
}
"#,
            ),
            (
                "main.go",
                r#"package main

import "fmt"

func NewStore() int { return 1 }

func compute() int {
	fmt.Println("compute")
	return 2
}

func main() {
	var total = compute()
	store := build()
	fmt.Println(total, store)
}
"#,
            ),
        ],
        "",
    );
    assert!(!run.diff.contains("wire_gen.go"));
    assert!(!run.diff.contains("StartTransaction"));
    assert_eq!(run.report.call_sites_fixed, 0);
    assert_snapshot!("generated_callees", run.patched());
}

#[test]
fn test_main_error_is_reassigned() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import "fmt"

func run() error {
	fmt.Println("run")
	return nil
}

func main() {
	err := run()
	if err != nil {
		fmt.Println(err)
	}
}
"#,
        )],
        "",
    );
    assert_snapshot!("main_error_reassigned", run.patched());
}

#[test]
fn test_instrumented_program_is_left_alone() {
    let run = run(
        &[(
            "main.go",
            r#"package main

import (
	"time"

	"github.com/newrelic/go-agent/v3/newrelic"
)

func work(txn *newrelic.Transaction) {
	defer txn.StartSegment("work").End()
}

func main() {
	app, err := newrelic.NewApplication(newrelic.ConfigFromEnvironment())
	if err != nil {
		panic(err)
	}
	txn := app.StartTransaction("work")
	work(txn)
	txn.End()
	app.Shutdown(5 * time.Second)
}
"#,
        )],
        "",
    );
    assert_eq!(run.diff, "");
    assert_eq!(run.report.files_patched, 0);
    assert_eq!(run.report.call_sites_fixed, 0);
}

#[test]
fn test_applied_output_is_stable() {
    for source in [TRACED_MAIN, HANDLER, ERRORS] {
        let first = run(&[("main.go", source)], "shop");
        let again = run(&[("main.go", source)], "shop");
        assert_eq!(first.diff, again.diff);

        for (name, text) in apply(first.dir.path(), &first.diff) {
            write(first.dir.path(), &name, &text);
        }
        let (diff, report) = instrument_dir(first.dir.path(), "shop");
        assert_eq!(diff, "", "re-instrumenting changed:\n{}", first.patched());
        assert_eq!(report.files_patched, 0);
    }
}

#[test]
fn test_tests_pass_nil_for_new_parameters() {
    let run = run(
        &[
            (
                "main.go",
                r#"package main

func work(n int) int {
	return n * 2
}

func main() {
	work(1)
}
"#,
            ),
            (
                "main_test.go",
                r#"package main

import "testing"

func TestWork(t *testing.T) {
	if work(2) != 4 {
		t.Fail()
	}
}
"#,
            ),
        ],
        "",
    );
    assert_eq!(run.report.call_sites_fixed, 1);
    assert_snapshot!("tests_pass_nil", run.patched());
}

#[test]
fn test_missing_main_is_fatal() {
    let dir = app(&[("lib.go", "package shop\n\nfunc Work() {}\n")]);
    let mut out = Vec::new();
    let err = instrument(&InstrumentOptions::new(dir.path()), &NoopResolver, &mut out).unwrap_err();
    assert!(matches!(err, Error::NoEntryPoint));
    assert!(out.is_empty());
}

#[test]
fn test_root_must_be_a_directory() {
    let dir = app(&[]);
    let file = dir.path().join("go.mod");
    let err = instrument(&InstrumentOptions::new(&file), &NoopResolver, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));
}
