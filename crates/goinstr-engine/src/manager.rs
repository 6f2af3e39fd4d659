//! The application under rewrite: its packages, their files and the table of
//! declared functions that tracing walks through.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use goinstr_syntax::ast::*;
use goinstr_syntax::walk::{stmt_exprs, walk_expr, walk_stmts};
use goinstr_syntax::TypeInfo;
use log::debug;

use crate::facts::Keeper;

pub struct SourceFile {
    pub path: PathBuf,
    /// Contents as read from disk.
    pub original: String,
    /// The unmodified tree printed back; a file differs from its baseline
    /// only once it has been rewritten.
    pub baseline: String,
    pub ast: File,
    /// Carries a `// Code generated ... DO NOT EDIT.` header.
    pub generated: bool,
}

/// Location of a function declaration inside its package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionEntry {
    pub file: usize,
    pub decl: usize,
    pub traced: bool,
}

pub struct Package {
    /// Key in the manager's package table; test packages carry a `_test`
    /// suffix.
    pub id: String,
    /// Import path the type resolver knows the package under.
    pub path: String,
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<SourceFile>,
    pub funcs: BTreeMap<String, FunctionEntry>,
    /// Imports generated code in this package needs.
    pub imports: BTreeSet<String>,
    pub test: bool,
}

impl Package {
    pub fn new(id: &str, path: &str, name: &str, dir: PathBuf, test: bool) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            name: name.to_string(),
            dir,
            files: Vec::new(),
            funcs: BTreeMap::new(),
            imports: BTreeSet::new(),
            test,
        }
    }

    pub fn decl(&self, entry: FunctionEntry) -> Option<&FuncDecl> {
        match &self.files.get(entry.file)?.ast.decls.get(entry.decl)?.kind {
            DeclKind::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn decl_mut(&mut self, entry: FunctionEntry) -> Option<&mut FuncDecl> {
        match &mut self.files.get_mut(entry.file)?.ast.decls.get_mut(entry.decl)?.kind {
            DeclKind::Func(f) => Some(f),
            _ => None,
        }
    }
}

/// A call resolved to a function declared in the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Invocation {
    /// Id of the declaring package.
    pub pkg: String,
    /// Function key: `Name`, or `Type.Name` for methods.
    pub name: String,
    pub package_name: String,
}

impl Invocation {
    /// Name used for segments and transactions.
    pub fn display_name(&self) -> &str {
        &self.name
    }
}

pub struct Manager {
    packages: BTreeMap<String, Package>,
    types: TypeInfo,
    facts: Keeper,
    /// Functions that gained a transaction parameter.
    extended: BTreeSet<(String, String)>,
    /// Functions called from generated code, whose signatures must not
    /// change.
    pinned: BTreeSet<(String, String)>,
    pub agent: String,
    pub app_name: String,
}

impl Manager {
    pub fn new(packages: Vec<Package>, types: TypeInfo, agent: &str, app_name: &str) -> Self {
        Self {
            packages: packages.into_iter().map(|p| (p.id.clone(), p)).collect(),
            types,
            facts: Keeper::new(),
            extended: BTreeSet::new(),
            pinned: BTreeSet::new(),
            agent: agent.to_string(),
            app_name: app_name.to_string(),
        }
    }

    pub fn types(&self) -> &TypeInfo {
        &self.types
    }

    pub fn facts(&self) -> &Keeper {
        &self.facts
    }

    pub fn facts_mut(&mut self) -> &mut Keeper {
        &mut self.facts
    }

    pub fn package(&self, id: &str) -> Option<&Package> {
        self.packages.get(id)
    }

    pub fn package_mut(&mut self, id: &str) -> Option<&mut Package> {
        self.packages.get_mut(id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn package_ids(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    /// Split borrow of the package table and the type information.
    pub fn parts_mut(&mut self) -> (&mut BTreeMap<String, Package>, &TypeInfo, &Keeper) {
        (&mut self.packages, &self.types, &self.facts)
    }

    /// Record the declaration at `decl` of file `file` in `pkg`'s function
    /// table.
    pub fn create_function_declaration(&mut self, pkg: &str, file: usize, decl: usize) {
        let Some(package) = self.packages.get_mut(pkg) else {
            return;
        };
        let entry = FunctionEntry {
            file,
            decl,
            traced: false,
        };
        let Some(key) = package.decl(entry).map(FuncDecl::key) else {
            return;
        };
        if key == "init" || key == "_" {
            return;
        }
        debug!("declared {pkg}.{key}");
        package.funcs.insert(key, entry);
    }

    /// Mark the function as traced.
    pub fn update_function_declaration(&mut self, inv: &Invocation) {
        if let Some(entry) = self
            .packages
            .get_mut(&inv.pkg)
            .and_then(|p| p.funcs.get_mut(&inv.name))
        {
            entry.traced = true;
        }
    }

    pub fn entry(&self, inv: &Invocation) -> Option<FunctionEntry> {
        self.packages.get(&inv.pkg)?.funcs.get(&inv.name).copied()
    }

    pub fn func_decl(&self, inv: &Invocation) -> Option<&FuncDecl> {
        let package = self.packages.get(&inv.pkg)?;
        package.decl(*package.funcs.get(&inv.name)?)
    }

    /// The callee's declaration together with the type information, for
    /// edits that need both.
    pub fn decl_with_types(&mut self, inv: &Invocation) -> Option<(&mut FuncDecl, &TypeInfo)> {
        let package = self.packages.get_mut(&inv.pkg)?;
        let entry = *package.funcs.get(&inv.name)?;
        let decl = package.decl_mut(entry)?;
        Some((decl, &self.types))
    }

    /// Detach the function's body for a walk that edits the rest of the
    /// application at the same time.
    pub fn take_body(&mut self, inv: &Invocation) -> Option<Block> {
        let package = self.packages.get_mut(&inv.pkg)?;
        let entry = *package.funcs.get(&inv.name)?;
        package.decl_mut(entry)?.body.take()
    }

    pub fn restore_body(&mut self, inv: &Invocation, body: Block) {
        let decl = self.packages.get_mut(&inv.pkg).and_then(|package| {
            let entry = *package.funcs.get(&inv.name)?;
            package.decl_mut(entry)
        });
        if let Some(decl) = decl {
            decl.body = Some(body);
        }
    }

    pub fn add_import(&mut self, pkg: &str, path: &str) {
        if let Some(package) = self.packages.get_mut(pkg) {
            package.imports.insert(path.to_string());
        }
    }

    pub fn mark_extended(&mut self, inv: &Invocation) {
        self.extended.insert((inv.pkg.clone(), inv.name.clone()));
    }

    pub fn is_extended(&self, pkg: &str, name: &str) -> bool {
        self.extended.contains(&(pkg.to_string(), name.to_string()))
    }

    pub fn extended(&self) -> impl Iterator<Item = &(String, String)> {
        self.extended.iter()
    }

    /// Whether the function is declared in a generated file.
    pub fn is_generated(&self, inv: &Invocation) -> bool {
        let Some(package) = self.packages.get(&inv.pkg) else {
            return false;
        };
        package
            .funcs
            .get(&inv.name)
            .and_then(|entry| package.files.get(entry.file))
            .is_some_and(|f| f.generated)
    }

    /// Record every application function a generated file calls. Those
    /// files are never rewritten, so the callees keep their signatures.
    pub fn pin_generated_callees(&mut self) {
        let mut pinned = BTreeSet::new();
        for package in self.packages.values() {
            let for_test = package.test.then_some(package.path.as_str());
            for file in package.files.iter().filter(|f| f.generated) {
                for func in file.ast.funcs() {
                    let Some(body) = &func.body else { continue };
                    walk_stmts(&body.stmts, &mut |stmt| {
                        for e in stmt_exprs(stmt) {
                            walk_expr(e, true, &mut |x| {
                                let inv = x.as_call().and_then(|c| self.resolve_invocation(c, for_test));
                                if let Some(inv) = inv {
                                    pinned.insert((inv.pkg, inv.name));
                                }
                            });
                        }
                    });
                }
            }
        }
        for (pkg, name) in &pinned {
            debug!("{pkg}.{name} is called from generated code");
        }
        self.pinned = pinned;
    }

    /// Resolve `call` to a function declared in the application. Calls from
    /// a test package may name `for_test`, the package under test.
    pub fn resolve_invocation(&self, call: &CallExpr, for_test: Option<&str>) -> Option<Invocation> {
        let callee = self.types.callee(call)?;
        let name = match &callee.recv {
            Some(recv) => format!("{recv}.{}", callee.name),
            None => callee.name.clone(),
        };
        let candidates = [Some(callee.pkg.as_str()), for_test];
        candidates.into_iter().flatten().find_map(|id| {
            let package = self.packages.get(id)?;
            package.funcs.contains_key(&name).then(|| Invocation {
                pkg: package.id.clone(),
                name: name.clone(),
                package_name: package.name.clone(),
            })
        })
    }

    /// Whether tracing should enter the function: declared in a non-test,
    /// non-generated file, with a body, not called from generated code and
    /// not traced yet.
    pub fn should_instrument_function(&self, inv: &Invocation) -> bool {
        let Some(package) = self.packages.get(&inv.pkg) else {
            return false;
        };
        let Some(entry) = package.funcs.get(&inv.name) else {
            return false;
        };
        if entry.traced || package.test || inv.name == "main" {
            return false;
        }
        if self.pinned.contains(&(inv.pkg.clone(), inv.name.clone())) {
            return false;
        }
        let generated = package.files.get(entry.file).is_none_or(|f| f.generated);
        !generated && package.decl(*entry).is_some_and(|d| d.body.is_some())
    }

    /// Application calls made by `stmt` itself, in source order. Nested
    /// blocks and function literals are not searched.
    pub fn find_all_invocations(&self, stmt: &Stmt, for_test: Option<&str>) -> Vec<Invocation> {
        let mut found = Vec::new();
        for e in stmt_exprs(stmt) {
            walk_expr(e, false, &mut |x| {
                if let Some(call) = x.as_call() {
                    if let Some(inv) = self.resolve_invocation(call, for_test) {
                        found.push(inv);
                    }
                }
            });
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goinstr_syntax::{PackageSource, parse_file, print_file};

    const SRC: &str = r#"package main

type store struct{}

func (s *store) load(id int) error { return nil }

func work(n int) int { return n }

func main() {
	s := &store{}
	_ = s.load(work(1))
}
"#;

    fn manager_with(sources: &[(&str, bool)]) -> Manager {
        let mut ids = IdGen::new();
        let mut types = TypeInfo::new(&mut ids).unwrap();
        let asts: Vec<File> = sources
            .iter()
            .map(|(src, _)| parse_file(src, &mut ids).unwrap())
            .collect();
        types.check(&[PackageSource {
            path: "example.com/app",
            name: "main",
            files: asts.iter().collect(),
        }]);
        let mut package = Package::new("example.com/app", "example.com/app", "main", PathBuf::new(), false);
        for (k, ((src, generated), ast)) in sources.iter().zip(asts).enumerate() {
            package.files.push(SourceFile {
                path: PathBuf::from(format!("file{k}.go")),
                original: src.to_string(),
                baseline: print_file(&ast),
                ast,
                generated: *generated,
            });
        }
        let decls: Vec<(usize, usize)> = package
            .files
            .iter()
            .enumerate()
            .flat_map(|(f, file)| (0..file.ast.decls.len()).map(move |d| (f, d)))
            .collect();
        let mut mgr = Manager::new(vec![package], types, "NewRelicAgent", "");
        for (file, decl) in decls {
            mgr.create_function_declaration("example.com/app", file, decl);
        }
        mgr
    }

    fn manager(src: &str) -> Manager {
        manager_with(&[(src, false)])
    }

    fn inv(name: &str) -> Invocation {
        Invocation {
            pkg: "example.com/app".into(),
            name: name.into(),
            package_name: "main".into(),
        }
    }

    fn main_inv() -> Invocation {
        Invocation {
            pkg: "example.com/app".into(),
            name: "main".into(),
            package_name: "main".into(),
        }
    }

    #[test]
    fn test_function_table_keys() {
        let mgr = manager(SRC);
        let package = mgr.package("example.com/app").unwrap();
        let keys: Vec<&str> = package.funcs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["main", "store.load", "work"]);
    }

    #[test]
    fn test_find_all_invocations_in_order() {
        let mgr = manager(SRC);
        let body = &mgr.func_decl(&main_inv()).unwrap().body.as_ref().unwrap().stmts;
        let names: Vec<String> = mgr
            .find_all_invocations(&body[1], None)
            .into_iter()
            .map(|inv| inv.name)
            .collect();
        assert_eq!(names, vec!["store.load", "work"]);
        assert!(mgr.find_all_invocations(&body[0], None).is_empty());
    }

    #[test]
    fn test_should_instrument_once() {
        let mut mgr = manager(SRC);
        let work = Invocation {
            pkg: "example.com/app".into(),
            name: "work".into(),
            package_name: "main".into(),
        };
        assert!(mgr.should_instrument_function(&work));
        assert!(!mgr.should_instrument_function(&main_inv()));
        mgr.update_function_declaration(&work);
        assert!(!mgr.should_instrument_function(&work));
    }

    #[test]
    fn test_take_and_restore_body() {
        let mut mgr = manager(SRC);
        let body = mgr.take_body(&main_inv()).unwrap();
        assert!(mgr.func_decl(&main_inv()).unwrap().body.is_none());
        mgr.restore_body(&main_inv(), body);
        assert_eq!(
            mgr.func_decl(&main_inv()).unwrap().body.as_ref().unwrap().stmts.len(),
            2
        );
    }

    #[test]
    fn test_callees_of_generated_code_keep_their_signature() {
        let main = "package main\n\nfunc NewStore() int { return 1 }\n\nfunc work() {}\n\nfunc main() {\n\tNewStore()\n\twork()\n}\n";
        let wire = "// Code generated by Wire. DO NOT EDIT.\n\npackage main\n\nfunc build() int {\n\treturn NewStore()\n}\n";
        let mut mgr = manager_with(&[(main, false), (wire, true)]);
        assert!(mgr.is_generated(&inv("build")));
        assert!(!mgr.is_generated(&inv("NewStore")));
        assert!(mgr.should_instrument_function(&inv("NewStore")));

        mgr.pin_generated_callees();
        assert!(!mgr.should_instrument_function(&inv("NewStore")));
        assert!(!mgr.should_instrument_function(&inv("build")));
        assert!(mgr.should_instrument_function(&inv("work")));
    }
}
