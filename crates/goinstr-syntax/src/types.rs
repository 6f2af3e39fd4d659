//! Best-effort type resolution.
//!
//! [`TypeInfo`] links identifier occurrences to the objects they declare or
//! use, following Go block scoping, and answers type queries for
//! expressions. Packages are checked in two phases: package-level
//! declarations of every package first, then function bodies, so calls and
//! selectors across packages and files resolve regardless of order.
//!
//! Resolution is deliberately partial. Anything the resolver cannot see
//! (raw statements, composite literal bodies, results of unknown packages)
//! simply has no type.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::debug;

use crate::ast::*;
use crate::imports::default_package_name;
use crate::parse::{ParseError, parse_file};
use crate::stdlib;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A named type; `pkg` is empty for predeclared types.
    Named { pkg: String, name: String },
    Pointer(Box<Type>),
    Func(Box<Signature>),
    /// Anything not modelled: slices, maps, channels, type parameters.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

impl Type {
    pub fn named(pkg: &str, name: &str) -> Self {
        Type::Named {
            pkg: pkg.to_string(),
            name: name.to_string(),
        }
    }

    pub fn pointer(inner: Type) -> Self {
        Type::Pointer(Box::new(inner))
    }

    /// Whether this is exactly the named type `pkg.name`.
    pub fn is(&self, pkg: &str, name: &str) -> bool {
        matches!(self, Type::Named { pkg: p, name: n } if p == pkg && n == name)
    }

    pub fn is_pointer_to(&self, pkg: &str, name: &str) -> bool {
        matches!(self, Type::Pointer(inner) if inner.is(pkg, name))
    }

    pub fn is_error(&self) -> bool {
        self.is("", "error")
    }

    /// The type with one level of pointer removed.
    pub fn deref(&self) -> &Type {
        match self {
            Type::Pointer(inner) => inner,
            other => other,
        }
    }

    pub fn as_named(&self) -> Option<(&str, &str)> {
        match self {
            Type::Named { pkg, name } => Some((pkg, name)),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Named { pkg, name } if pkg.is_empty() => f.write_str(name),
            Type::Named { pkg, name } => write!(f, "{pkg}.{name}"),
            Type::Pointer(inner) => write!(f, "*{inner}"),
            Type::Func(sig) => {
                f.write_str("func(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if sig.variadic && i + 1 == sig.params.len() {
                        f.write_str("...")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")?;
                match sig.results.as_slice() {
                    [] => Ok(()),
                    [one] => write!(f, " {one}"),
                    many => {
                        f.write_str(" (")?;
                        for (i, r) in many.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{r}")?;
                        }
                        f.write_str(")")
                    }
                }
            }
            Type::Other(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Var,
    Const,
    Func,
    TypeName,
    PkgName,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjectKind,
    pub name: String,
    /// Import path of the declaring package; empty for the universe scope.
    pub pkg: String,
    pub ty: Option<Type>,
    /// For [`ObjectKind::PkgName`], the imported path.
    pub imported: Option<String>,
}

/// The function or method a call expression targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Callee {
    /// Import path of the package declaring the function or receiver type.
    pub pkg: String,
    pub name: String,
    /// Receiver type name, without pointer, for method calls.
    pub recv: Option<String>,
    pub signature: Option<Signature>,
}

impl Callee {
    /// A package-level function `pkg.name`.
    pub fn is_func(&self, pkg: &str, name: &str) -> bool {
        self.recv.is_none() && self.pkg == pkg && self.name == name
    }

    /// A method `name` on the type `pkg.recv`.
    pub fn is_method(&self, pkg: &str, recv: &str, name: &str) -> bool {
        self.recv.as_deref() == Some(recv) && self.pkg == pkg && self.name == name
    }
}

#[derive(Debug, Clone, Default)]
struct TypeDecl {
    fields: Vec<(Option<String>, Type)>,
    methods: BTreeMap<String, Signature>,
    /// Embedded interfaces.
    embeds: Vec<Type>,
    interface: bool,
}

#[derive(Debug, Clone, Default)]
struct PackageInfo {
    name: String,
    members: HashMap<String, ObjectId>,
}

/// One package to check: its import path, package clause name and files.
pub struct PackageSource<'a> {
    pub path: &'a str,
    pub name: &'a str,
    pub files: Vec<&'a File>,
}

#[derive(Debug, Default)]
pub struct TypeInfo {
    objects: Vec<Object>,
    uses: HashMap<NodeId, ObjectId>,
    packages: HashMap<String, PackageInfo>,
    types: HashMap<(String, String), TypeDecl>,
    universe: HashMap<String, ObjectId>,
}

impl TypeInfo {
    /// A resolver seeded with the universe scope and the known packages.
    /// Stub identifiers draw their ids from `ids` so they never collide with
    /// application nodes.
    pub fn new(ids: &mut IdGen) -> Result<Self, ParseError> {
        let mut info = TypeInfo::default();
        info.seed_universe();

        let mut stubs = Vec::new();
        for (path, source) in stdlib::KNOWN_PACKAGES {
            stubs.push((*path, parse_file(source, ids)?));
        }
        let sources: Vec<PackageSource<'_>> = stubs
            .iter()
            .map(|(path, file)| PackageSource {
                path,
                name: &file.package,
                files: vec![file],
            })
            .collect();
        info.check(&sources);
        Ok(info)
    }

    fn seed_universe(&mut self) {
        for name in stdlib::PREDECLARED_TYPES {
            let id = self.new_object(ObjectKind::TypeName, name, "", Some(Type::named("", name)));
            self.universe.insert(name.to_string(), id);
        }
        for name in stdlib::BUILTIN_FUNCS {
            let id = self.new_object(ObjectKind::Func, name, "", None);
            self.universe.insert(name.to_string(), id);
        }
        for name in stdlib::PREDECLARED_CONSTS {
            let ty = match *name {
                "true" | "false" => Some(Type::named("", "bool")),
                "iota" => Some(Type::named("", "int")),
                _ => None,
            };
            let id = self.new_object(ObjectKind::Const, name, "", ty);
            self.universe.insert(name.to_string(), id);
        }
        let mut error = TypeDecl {
            interface: true,
            ..Default::default()
        };
        error.methods.insert(
            "Error".to_string(),
            Signature {
                results: vec![Type::named("", "string")],
                ..Default::default()
            },
        );
        self.types.insert((String::new(), "error".to_string()), error);
    }

    fn new_object(&mut self, kind: ObjectKind, name: &str, pkg: &str, ty: Option<Type>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object {
            kind,
            name: name.to_string(),
            pkg: pkg.to_string(),
            ty,
            imported: None,
        });
        id
    }

    /// Check a set of packages: declarations of all of them first, then
    /// function bodies.
    pub fn check(&mut self, packages: &[PackageSource<'_>]) {
        for pkg in packages {
            self.packages
                .entry(pkg.path.to_string())
                .or_default()
                .name = pkg.name.to_string();
        }
        for pkg in packages {
            self.declare_type_names(pkg);
        }
        for pkg in packages {
            for file in &pkg.files {
                let mut r = Resolver::new(self, pkg.path, file);
                r.declare_file(file);
            }
        }
        for pkg in packages {
            for file in &pkg.files {
                let mut r = Resolver::new(self, pkg.path, file);
                r.resolve_file(file);
            }
            debug!("checked package {}", pkg.path);
        }
    }

    fn declare_type_names(&mut self, pkg: &PackageSource<'_>) {
        for file in &pkg.files {
            for decl in &file.decls {
                let DeclKind::Gen(group) = &decl.kind else {
                    continue;
                };
                for spec in &group.specs {
                    let Spec::Type(ts) = spec else { continue };
                    let id = self.new_object(
                        ObjectKind::TypeName,
                        &ts.name,
                        pkg.path,
                        Some(Type::named(pkg.path, &ts.name)),
                    );
                    self.member_map(pkg.path).insert(ts.name.clone(), id);
                    self.types
                        .entry((pkg.path.to_string(), ts.name.clone()))
                        .or_default();
                }
            }
        }
    }

    fn member_map(&mut self, path: &str) -> &mut HashMap<String, ObjectId> {
        &mut self.packages.entry(path.to_string()).or_default().members
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    /// The object an identifier occurrence declares or refers to.
    pub fn object_id(&self, ident: &Ident) -> Option<ObjectId> {
        self.uses.get(&ident.id).copied()
    }

    pub fn object_of(&self, ident: &Ident) -> Option<&Object> {
        self.object_id(ident).map(|id| self.object(id))
    }

    /// Package clause name of a checked package.
    pub fn package_name(&self, path: &str) -> Option<&str> {
        self.packages.get(path).map(|p| p.name.as_str())
    }

    /// A package-level member of a checked package.
    pub fn member(&self, path: &str, name: &str) -> Option<&Object> {
        let pkg = self.packages.get(path)?;
        pkg.members.get(name).map(|id| self.object(*id))
    }

    /// A type declared by a checked package is an interface.
    pub fn is_interface(&self, ty: &Type) -> bool {
        ty.deref()
            .as_named()
            .and_then(|(pkg, name)| self.types.get(&(pkg.to_string(), name.to_string())))
            .is_some_and(|decl| decl.interface)
    }

    /// Look up a field on a (possibly pointer to) named struct type,
    /// following embedded fields.
    pub fn field(&self, ty: &Type, name: &str) -> Option<Type> {
        self.field_in(ty, name, 0)
    }

    fn field_in(&self, ty: &Type, name: &str, depth: usize) -> Option<Type> {
        if depth > 4 {
            return None;
        }
        let (pkg, tname) = ty.deref().as_named()?;
        let decl = self.types.get(&(pkg.to_string(), tname.to_string()))?;
        for (fname, fty) in &decl.fields {
            if fname.as_deref() == Some(name) {
                return Some(fty.clone());
            }
        }
        decl.fields
            .iter()
            .filter(|(fname, _)| fname.is_none())
            .find_map(|(_, fty)| self.field_in(fty, name, depth + 1))
    }

    /// Look up a method, following embedded fields and interfaces. Returns
    /// the signature and the type that declares it.
    pub fn method(&self, ty: &Type, name: &str) -> Option<(Signature, Type)> {
        self.method_in(ty, name, 0)
    }

    fn method_in(&self, ty: &Type, name: &str, depth: usize) -> Option<(Signature, Type)> {
        if depth > 4 {
            return None;
        }
        let named = ty.deref();
        let (pkg, tname) = named.as_named()?;
        let decl = self.types.get(&(pkg.to_string(), tname.to_string()))?;
        if let Some(sig) = decl.methods.get(name) {
            return Some((sig.clone(), named.clone()));
        }
        decl.fields
            .iter()
            .filter(|(fname, _)| fname.is_none())
            .map(|(_, fty)| fty)
            .chain(decl.embeds.iter())
            .find_map(|inner| self.method_in(inner, name, depth + 1))
    }

    /// Interfaces embedded by a named interface type.
    pub fn embedded_interfaces(&self, ty: &Type) -> Vec<Type> {
        ty.deref()
            .as_named()
            .and_then(|(pkg, name)| self.types.get(&(pkg.to_string(), name.to_string())))
            .map(|decl| decl.embeds.clone())
            .unwrap_or_default()
    }

    /// Type of an expression in a type position (`*http.Request`).
    pub fn type_expr(&self, expr: &Expr) -> Option<Type> {
        match &expr.kind {
            ExprKind::Ident(id) => {
                let obj = self.object_of(id)?;
                match obj.kind {
                    ObjectKind::TypeName => obj.ty.clone(),
                    _ => None,
                }
            }
            ExprKind::Selector { x, sel } => {
                let pkg = self.imported_path(x)?;
                match self.member(&pkg, &sel.name) {
                    Some(obj) if obj.kind == ObjectKind::TypeName => obj.ty.clone(),
                    Some(_) => None,
                    None => Some(Type::named(&pkg, &sel.name)),
                }
            }
            ExprKind::Star(inner) => self.type_expr(inner).map(Type::pointer),
            ExprKind::Paren(inner) => self.type_expr(inner),
            ExprKind::Index { x, .. } => self.type_expr(x),
            ExprKind::Raw(text) => Some(Type::Other(text.clone())),
            _ => None,
        }
    }

    /// The import path a package-qualifier identifier refers to.
    pub fn imported_path(&self, expr: &Expr) -> Option<String> {
        let id = expr.as_ident()?;
        let obj = self.object_of(id)?;
        match obj.kind {
            ObjectKind::PkgName => obj.imported.clone(),
            _ => None,
        }
    }

    /// Type of a value expression.
    pub fn type_of(&self, expr: &Expr) -> Option<Type> {
        match &expr.kind {
            ExprKind::Ident(id) => {
                let obj = self.object_of(id)?;
                match obj.kind {
                    ObjectKind::Var | ObjectKind::Const | ObjectKind::Func => obj.ty.clone(),
                    _ => None,
                }
            }
            ExprKind::BasicLit(lit) => Some(literal_type(lit)),
            ExprKind::Selector { x, sel } => {
                if let Some(pkg) = self.imported_path(x) {
                    let obj = self.member(&pkg, &sel.name)?;
                    return match obj.kind {
                        ObjectKind::TypeName | ObjectKind::PkgName => None,
                        _ => obj.ty.clone(),
                    };
                }
                let base = self.type_of(x)?;
                if let Some(field) = self.field(&base, &sel.name) {
                    return Some(field);
                }
                self.method(&base, &sel.name)
                    .map(|(sig, _)| Type::Func(Box::new(sig)))
            }
            ExprKind::Call(call) => match self.results_of_call(call).as_slice() {
                [one] => Some(one.clone()),
                _ => None,
            },
            ExprKind::Star(x) => match self.type_of(x)? {
                Type::Pointer(inner) => Some(*inner),
                _ => None,
            },
            ExprKind::Unary { op, x } if op == "&" => self.type_of(x).map(Type::pointer),
            ExprKind::Unary { op, x } if op != "<-" => self.type_of(x),
            ExprKind::Binary { x, op, .. } => match op.as_str() {
                "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" => {
                    Some(Type::named("", "bool"))
                }
                _ => self.type_of(x),
            },
            ExprKind::Paren(inner) => self.type_of(inner),
            ExprKind::CompositeLit { ty: Some(ty), .. } => self.type_expr(ty),
            ExprKind::FuncLit(lit) => Some(Type::Func(Box::new(self.func_lit_signature(lit)))),
            _ => None,
        }
    }

    fn func_lit_signature(&self, lit: &FuncLit) -> Signature {
        let params = lit
            .params
            .params()
            .into_iter()
            .map(|(_, ty)| self.type_expr(ty).unwrap_or_else(|| Type::Other(String::new())))
            .collect();
        let results = lit
            .results
            .as_ref()
            .map(|r| {
                r.types
                    .iter()
                    .map(|ty| self.type_expr(ty).unwrap_or_else(|| Type::Other(String::new())))
                    .collect()
            })
            .unwrap_or_default();
        Signature {
            params,
            results,
            variadic: lit.params.is_variadic(),
        }
    }

    /// Result types of a call, one per returned value.
    pub fn results_of_call(&self, call: &CallExpr) -> Vec<Type> {
        let fun = call.fun.unparen();
        if let ExprKind::Ident(id) = &fun.kind {
            if let Some(obj) = self.object_of(id) {
                match (obj.kind, obj.pkg.is_empty(), obj.name.as_str()) {
                    (ObjectKind::Func, true, "new") => {
                        return call
                            .args
                            .first()
                            .and_then(|a| self.type_expr(a))
                            .map(Type::pointer)
                            .into_iter()
                            .collect();
                    }
                    (ObjectKind::TypeName, _, _) => return obj.ty.clone().into_iter().collect(),
                    _ => {}
                }
            }
        }
        if let ExprKind::Selector { x, sel } = &fun.kind {
            if let Some(pkg) = self.imported_path(x) {
                if let Some(obj) = self.member(&pkg, &sel.name) {
                    if obj.kind == ObjectKind::TypeName {
                        return obj.ty.clone().into_iter().collect();
                    }
                }
            }
        }
        match self.type_of(fun) {
            Some(Type::Func(sig)) => sig.results,
            _ => Vec::new(),
        }
    }

    /// The declared function or method targeted by `call`.
    pub fn callee(&self, call: &CallExpr) -> Option<Callee> {
        match &call.fun.unparen().kind {
            ExprKind::Ident(id) => {
                let obj = self.object_of(id)?;
                if obj.kind != ObjectKind::Func {
                    return None;
                }
                Some(Callee {
                    pkg: obj.pkg.clone(),
                    name: obj.name.clone(),
                    recv: None,
                    signature: match &obj.ty {
                        Some(Type::Func(sig)) => Some((**sig).clone()),
                        _ => None,
                    },
                })
            }
            ExprKind::Selector { x, sel } => {
                if let Some(pkg) = self.imported_path(x) {
                    let signature = match self.member(&pkg, &sel.name).and_then(|o| o.ty.as_ref()) {
                        Some(Type::Func(sig)) => Some((**sig).clone()),
                        _ => None,
                    };
                    return Some(Callee {
                        pkg,
                        name: sel.name.clone(),
                        recv: None,
                        signature,
                    });
                }
                let base = self.type_of(x)?;
                match self.method(&base, &sel.name) {
                    Some((sig, owner)) => {
                        let (pkg, recv) = owner.as_named()?;
                        Some(Callee {
                            pkg: pkg.to_string(),
                            name: sel.name.clone(),
                            recv: Some(recv.to_string()),
                            signature: Some(sig),
                        })
                    }
                    None => {
                        // A method of an application type the resolver has
                        // no declaration for still names its receiver.
                        let (pkg, recv) = base.deref().as_named()?;
                        if pkg.is_empty() || self.field(&base, &sel.name).is_some() {
                            return None;
                        }
                        Some(Callee {
                            pkg: pkg.to_string(),
                            name: sel.name.clone(),
                            recv: Some(recv.to_string()),
                            signature: None,
                        })
                    }
                }
            }
            _ => None,
        }
    }
}

fn literal_type(lit: &str) -> Type {
    let name = match lit.chars().next() {
        Some('"') | Some('`') => "string",
        Some('\'') => "rune",
        _ if lit.ends_with('i') => "complex128",
        _ if lit.contains(['.', 'e', 'E']) && !lit.starts_with("0x") => "float64",
        _ => "int",
    };
    Type::named("", name)
}

/// Scope-tracking walker for one file.
struct Resolver<'t> {
    info: &'t mut TypeInfo,
    pkg: String,
    file_scope: HashMap<String, ObjectId>,
    scopes: Vec<HashMap<String, ObjectId>>,
}

impl<'t> Resolver<'t> {
    fn new(info: &'t mut TypeInfo, pkg: &str, file: &File) -> Self {
        let mut file_scope = HashMap::new();
        for spec in file.imports() {
            let name = match spec.name.as_deref() {
                Some("_") | Some(".") => continue,
                Some(name) => name.to_string(),
                None => info
                    .package_name(&spec.path)
                    .map(str::to_string)
                    .unwrap_or_else(|| default_package_name(&spec.path)),
            };
            let id = info.new_object(ObjectKind::PkgName, &name, pkg, None);
            info.objects[id.0 as usize].imported = Some(spec.path.clone());
            file_scope.insert(name, id);
        }
        Self {
            info,
            pkg: pkg.to_string(),
            file_scope,
            scopes: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<ObjectId> {
        for scope in self.scopes.iter().rev() {
            if let Some(id) = scope.get(name) {
                return Some(*id);
            }
        }
        if let Some(id) = self.file_scope.get(name) {
            return Some(*id);
        }
        if let Some(id) = self
            .info
            .packages
            .get(&self.pkg)
            .and_then(|p| p.members.get(name))
        {
            return Some(*id);
        }
        self.info.universe.get(name).copied()
    }

    fn use_ident(&mut self, ident: &Ident) {
        if ident.is_blank() || ident.id.is_synthetic() {
            return;
        }
        if let Some(id) = self.lookup(&ident.name) {
            self.info.uses.insert(ident.id, id);
        }
    }

    fn declare_local(&mut self, ident: &Ident, kind: ObjectKind, ty: Option<Type>) -> Option<ObjectId> {
        if ident.is_blank() || ident.id.is_synthetic() {
            return None;
        }
        let id = self.info.new_object(kind, &ident.name, &self.pkg, ty);
        self.info.uses.insert(ident.id, id);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(ident.name.clone(), id);
        }
        Some(id)
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Resolve a type expression, recording the identifiers it uses.
    fn resolve_type(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::Ident(id) => {
                self.use_ident(id);
                match self.info.object_of(id) {
                    Some(obj) if obj.kind == ObjectKind::TypeName => obj
                        .ty
                        .clone()
                        .unwrap_or_else(|| Type::Other(id.name.clone())),
                    _ => Type::Other(id.name.clone()),
                }
            }
            ExprKind::Selector { x, sel } => {
                if let Some(qual) = x.as_ident() {
                    self.use_ident(qual);
                }
                match self.info.imported_path(x) {
                    Some(pkg) => match self.info.member(&pkg, &sel.name) {
                        Some(obj) if obj.kind == ObjectKind::TypeName => obj
                            .ty
                            .clone()
                            .unwrap_or_else(|| Type::named(&pkg, &sel.name)),
                        _ => Type::named(&pkg, &sel.name),
                    },
                    None => Type::Other(crate::printer::expr_to_string(expr)),
                }
            }
            ExprKind::Star(inner) => Type::pointer(self.resolve_type(inner)),
            ExprKind::Paren(inner) => self.resolve_type(inner),
            ExprKind::Index { x, indices } => {
                for index in indices {
                    self.resolve_type(index);
                }
                self.resolve_type(x)
            }
            _ => Type::Other(crate::printer::expr_to_string(expr)),
        }
    }

    fn signature(&mut self, params: &FieldList, results: Option<&Results>) -> Signature {
        let mut sig = Signature {
            variadic: params.is_variadic(),
            ..Default::default()
        };
        for field in &params.fields {
            let ty = self.resolve_type(&field.ty);
            for _ in 0..field.names.len().max(1) {
                sig.params.push(ty.clone());
            }
        }
        if let Some(results) = results {
            for ty in &results.types {
                sig.results.push(self.resolve_type(ty));
            }
        }
        sig
    }

    fn declare_file(&mut self, file: &File) {
        for decl in &file.decls {
            match &decl.kind {
                DeclKind::Func(func) => self.declare_func(func),
                DeclKind::Gen(group) => self.declare_gen(group),
                _ => {}
            }
        }
    }

    fn declare_func(&mut self, func: &FuncDecl) {
        let sig = self.signature(&func.params, func.results.as_ref());
        match func.receiver_type_name() {
            Some(recv) => {
                if let Some(field) = func.recv.as_ref().and_then(|r| r.fields.first()) {
                    self.resolve_type(&field.ty);
                }
                self.info
                    .types
                    .entry((self.pkg.clone(), recv.to_string()))
                    .or_default()
                    .methods
                    .insert(func.name.name.clone(), sig);
            }
            None => {
                let id = self.info.new_object(
                    ObjectKind::Func,
                    &func.name.name,
                    &self.pkg,
                    Some(Type::Func(Box::new(sig))),
                );
                self.info.uses.insert(func.name.id, id);
                let pkg = self.pkg.clone();
                self.info.member_map(&pkg).insert(func.name.name.clone(), id);
            }
        }
    }

    fn declare_gen(&mut self, group: &GenDecl) {
        for spec in &group.specs {
            match spec {
                Spec::Type(ts) => self.declare_type(ts),
                Spec::Value(vs) => {
                    let ty = vs.ty.as_ref().map(|t| self.resolve_type(t));
                    let kind = if vs.constant {
                        ObjectKind::Const
                    } else {
                        ObjectKind::Var
                    };
                    for name in &vs.names {
                        if name.is_blank() {
                            continue;
                        }
                        let id = self.info.new_object(kind, &name.name, &self.pkg, ty.clone());
                        self.info.uses.insert(name.id, id);
                        let pkg = self.pkg.clone();
                        self.info.member_map(&pkg).insert(name.name.clone(), id);
                    }
                }
            }
        }
    }

    fn declare_type(&mut self, ts: &TypeSpec) {
        let key = (self.pkg.clone(), ts.name.clone());
        let mut decl = self.info.types.get(&key).cloned().unwrap_or_default();
        match &ts.def {
            TypeDef::Struct(fields) => {
                for field in fields {
                    let ty = self.resolve_type(&field.ty);
                    decl.fields.push((field.name.clone(), ty));
                }
            }
            TypeDef::Interface { embeds, methods } => {
                decl.interface = true;
                for embed in embeds {
                    let ty = self.resolve_type(embed);
                    decl.embeds.push(ty);
                }
                for m in methods {
                    let sig = self.signature(&m.params, m.results.as_ref());
                    decl.methods.insert(m.name.clone(), sig);
                }
            }
            TypeDef::Other(expr) => {
                let underlying = self.resolve_type(expr);
                if ts.alias {
                    let member = self
                        .info
                        .packages
                        .get(&self.pkg)
                        .and_then(|p| p.members.get(&ts.name))
                        .copied();
                    if let Some(id) = member {
                        self.info.objects[id.0 as usize].ty = Some(underlying.clone());
                    }
                }
                let base_interface = underlying
                    .deref()
                    .as_named()
                    .and_then(|(pkg, name)| self.info.types.get(&(pkg.to_string(), name.to_string())))
                    .is_some_and(|base| base.interface);
                if ts.alias || base_interface {
                    decl.interface = base_interface;
                    decl.embeds.push(underlying);
                }
            }
        }
        self.info.types.insert(key, decl);
    }

    fn resolve_file(&mut self, file: &File) {
        for decl in &file.decls {
            match &decl.kind {
                DeclKind::Func(func) => self.resolve_func(func),
                DeclKind::Gen(group) => {
                    for spec in &group.specs {
                        let Spec::Value(vs) = spec else { continue };
                        for value in &vs.values {
                            self.expr(value);
                        }
                        if vs.ty.is_none() && vs.values.len() == vs.names.len() {
                            for (name, value) in vs.names.iter().zip(&vs.values) {
                                let ty = self.info.type_of(value);
                                if let Some(id) = self.info.object_id(name) {
                                    self.info.objects[id.0 as usize].ty = ty;
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn declare_params(&mut self, params: &FieldList) {
        for field in &params.fields {
            let ty = self.resolve_type(&field.ty);
            let ty = if field.variadic {
                Type::Other(format!("[]{ty}"))
            } else {
                ty
            };
            for name in &field.names {
                self.declare_local(name, ObjectKind::Var, Some(ty.clone()));
            }
        }
    }

    fn resolve_func(&mut self, func: &FuncDecl) {
        let Some(body) = &func.body else { return };
        self.push();
        if let Some(recv) = &func.recv {
            self.declare_params(recv);
        }
        self.declare_params(&func.params);
        if let Some(results) = &func.results {
            for ty in &results.types {
                self.resolve_type(ty);
            }
        }
        self.stmts(&body.stmts);
        self.pop();
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.push();
        self.stmts(stmts);
        self.pop();
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::Go(e) | StmtKind::Defer(e) => self.expr(e),
            StmtKind::Assign { lhs, op, rhs } => {
                for e in rhs {
                    self.expr(e);
                }
                match op {
                    AssignOp::Assign => {
                        for e in lhs {
                            self.expr(e);
                        }
                    }
                    AssignOp::Define => self.define(lhs, rhs),
                }
            }
            StmtKind::Return(results) => {
                for e in results {
                    self.expr(e);
                }
            }
            StmtKind::If(s) => {
                self.push();
                if let Some(init) = &s.init {
                    self.stmt(init);
                }
                self.expr(&s.cond);
                self.block(&s.body.stmts);
                if let Some(els) = &s.els {
                    self.stmt(els);
                }
                self.pop();
            }
            StmtKind::For(f) => {
                self.push();
                match &f.header {
                    ForHeader::Cond(c) => self.expr(c),
                    ForHeader::Range { key, value, op, x } => {
                        self.expr(x);
                        for e in key.iter().chain(value.iter()) {
                            match (op, e.as_ident()) {
                                (Some(AssignOp::Define), Some(id)) => {
                                    self.declare_local(id, ObjectKind::Var, None);
                                }
                                _ => self.expr(e),
                            }
                        }
                    }
                    ForHeader::Infinite | ForHeader::Clause(_) => {}
                }
                self.block(&f.body.stmts);
                self.pop();
            }
            StmtKind::Switch(s) => {
                for clause in &s.clauses {
                    self.block(&clause.body);
                }
            }
            StmtKind::Select(s) => {
                for clause in &s.clauses {
                    self.block(&clause.body);
                }
            }
            StmtKind::Block(b) => self.block(&b.stmts),
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt),
            StmtKind::Decl(group) => {
                for spec in &group.specs {
                    match spec {
                        Spec::Value(vs) => {
                            for value in &vs.values {
                                self.expr(value);
                            }
                            let ty = vs.ty.as_ref().map(|t| self.resolve_type(t));
                            let kind = if vs.constant {
                                ObjectKind::Const
                            } else {
                                ObjectKind::Var
                            };
                            for (i, name) in vs.names.iter().enumerate() {
                                let ty = ty.clone().or_else(|| {
                                    vs.values.get(i).and_then(|v| self.info.type_of(v))
                                });
                                self.declare_local(name, kind, ty);
                            }
                        }
                        Spec::Type(ts) => {
                            let ty = Type::named(&self.pkg, &ts.name);
                            let id = self.info.new_object(
                                ObjectKind::TypeName,
                                &ts.name,
                                &self.pkg,
                                Some(ty),
                            );
                            if let Some(scope) = self.scopes.last_mut() {
                                scope.insert(ts.name.clone(), id);
                            }
                        }
                    }
                }
            }
            StmtKind::Raw(_) => {}
        }
    }

    fn define(&mut self, lhs: &[Expr], rhs: &[Expr]) {
        let types: Vec<Option<Type>> = if lhs.len() == rhs.len() {
            rhs.iter().map(|e| self.info.type_of(e)).collect()
        } else if let [single] = rhs {
            match single.unparen().as_call() {
                Some(call) => {
                    let results = self.info.results_of_call(call);
                    (0..lhs.len()).map(|i| results.get(i).cloned()).collect()
                }
                None => vec![None; lhs.len()],
            }
        } else {
            vec![None; lhs.len()]
        };

        for (e, ty) in lhs.iter().zip(types) {
            let Some(id) = e.as_ident() else {
                self.expr(e);
                continue;
            };
            let redeclared = self
                .scopes
                .last()
                .and_then(|scope| scope.get(&id.name))
                .copied();
            match redeclared {
                Some(existing) => {
                    self.info.uses.insert(id.id, existing);
                }
                None => {
                    self.declare_local(id, ObjectKind::Var, ty);
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(id) => self.use_ident(id),
            ExprKind::Selector { x, .. } => self.expr(x),
            ExprKind::Call(call) => {
                self.expr(&call.fun);
                for arg in &call.args {
                    self.expr(arg);
                }
            }
            ExprKind::Star(x) | ExprKind::Unary { x, .. } | ExprKind::Paren(x) => self.expr(x),
            ExprKind::Binary { x, y, .. } => {
                self.expr(x);
                self.expr(y);
            }
            ExprKind::Index { x, indices } => {
                self.expr(x);
                for index in indices {
                    self.expr(index);
                }
            }
            ExprKind::CompositeLit { ty: Some(ty), .. } => {
                self.resolve_type(ty);
            }
            ExprKind::FuncLit(lit) => {
                self.push();
                self.declare_params(&lit.params);
                if let Some(results) = &lit.results {
                    for ty in &results.types {
                        self.resolve_type(ty);
                    }
                }
                self.stmts(&lit.body.stmts);
                self.pop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(src: &str) -> (File, TypeInfo) {
        let mut ids = IdGen::new();
        let mut info = TypeInfo::new(&mut ids).unwrap();
        let file = crate::parse::parse_file(src, &mut ids).unwrap();
        info.check(&[PackageSource {
            path: "example.com/app",
            name: "main",
            files: vec![&file],
        }]);
        (file, info)
    }

    fn body<'f>(file: &'f File, name: &str) -> &'f [Stmt] {
        &file
            .funcs()
            .find(|f| f.name.name == name)
            .and_then(|f| f.body.as_ref())
            .unwrap()
            .stmts
    }

    fn call_of(stmt: &Stmt) -> &CallExpr {
        match &stmt.kind {
            StmtKind::Expr(e) => e.as_call().unwrap(),
            StmtKind::Assign { rhs, .. } => rhs[0].as_call().unwrap(),
            _ => panic!("no call in statement"),
        }
    }

    const APP: &str = r#"package main

import (
	"context"
	"net/http"
)

type server struct {
	client *http.Client
}

func (s *server) fetch(ctx context.Context, req *http.Request) error {
	resp, err := s.client.Do(req)
	_ = resp
	return err
}

func handler(w http.ResponseWriter, r *http.Request) {
	ctx := r.Context()
	s := &server{client: &http.Client{}}
	s.fetch(ctx, r)
}

func main() {
	resp, err := http.DefaultClient.Do(nil)
	_, _ = resp, err
	http.HandleFunc("/", handler)
}
"#;

    #[test]
    fn test_param_types_are_fully_qualified() {
        let (file, info) = check(APP);
        let handler = file.funcs().find(|f| f.name.name == "handler").unwrap();
        let params = handler.params.params();
        let w = info.object_of(params[0].0.unwrap()).unwrap();
        assert_eq!(w.ty.as_ref().unwrap().to_string(), "net/http.ResponseWriter");
        let r = info.object_of(params[1].0.unwrap()).unwrap();
        assert!(r.ty.as_ref().unwrap().is_pointer_to("net/http", "Request"));
    }

    #[test]
    fn test_method_call_on_std_type() {
        let (file, info) = check(APP);
        let stmts = body(&file, "main");
        let callee = info.callee(call_of(&stmts[0])).unwrap();
        assert!(callee.is_method("net/http", "Client", "Do"));

        let StmtKind::Assign { lhs, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        let err = info.type_of(&lhs[1]).unwrap();
        assert!(err.is_error());
        let resp = info.type_of(&lhs[0]).unwrap();
        assert!(resp.is_pointer_to("net/http", "Response"));
    }

    #[test]
    fn test_package_function_callee() {
        let (file, info) = check(APP);
        let stmts = body(&file, "main");
        let callee = info.callee(call_of(&stmts[2])).unwrap();
        assert!(callee.is_func("net/http", "HandleFunc"));
    }

    #[test]
    fn test_application_method_and_context_types() {
        let (file, info) = check(APP);
        let stmts = body(&file, "handler");
        let StmtKind::Assign { lhs, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        assert!(info.type_of(&lhs[0]).unwrap().is("context", "Context"));

        let callee = info.callee(call_of(&stmts[2])).unwrap();
        assert!(callee.is_method("example.com/app", "server", "fetch"));
        assert_eq!(callee.signature.unwrap().params.len(), 2);
    }

    #[test]
    fn test_field_selector_through_struct() {
        let (file, info) = check(APP);
        let fetch = file.funcs().find(|f| f.name.name == "fetch").unwrap();
        let call = call_of(&fetch.body.as_ref().unwrap().stmts[0]);
        let callee = info.callee(call).unwrap();
        assert!(callee.is_method("net/http", "Client", "Do"));
    }

    #[test]
    fn test_generic_stream_interface_methods() {
        let (_, info) = check("package main\n");
        let stream = Type::named("google.golang.org/grpc", "ServerStreamingServer");
        let (sig, owner) = info.method(&stream, "Context").unwrap();
        assert!(owner.is("google.golang.org/grpc", "ServerStream"));
        assert!(sig.results[0].is("context", "Context"));
    }
}
