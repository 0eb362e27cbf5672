use crate::server::types::{HttpMethod, Route, RouteBehavior, RouteTable, ScratchArea, ServiceSpec};

/// `nginx.conf` for one harnessed web server.
///
/// Everything the server writes (pid file, temp bodies) stays inside the
/// scratch area, and both logs go to stdout so the supervisor can see the
/// `start worker process` notice.
#[derive(Debug)]
pub struct NginxConfig<'a> {
    spec: &'a ServiceSpec,
    scratch: &'a ScratchArea,
    routes: &'a RouteTable,
    run_as: Option<String>,
}

impl<'a> NginxConfig<'a> {
    pub fn new(spec: &'a ServiceSpec, scratch: &'a ScratchArea, routes: &'a RouteTable) -> Self {
        Self {
            spec,
            scratch,
            routes,
            run_as: privileged_user(),
        }
    }

    /// Value of the `user` directive; `None` omits it.
    pub fn run_as(mut self, user: Option<String>) -> Self {
        self.run_as = user;
        self
    }

    pub fn render(&self) -> String {
        let scratch = self.scratch.path().display().to_string();
        let mut out = Conf::default();

        out.line("daemon off;");
        if let Some(user) = &self.run_as {
            out.line(format!("user {user};"));
        }
        out.line("worker_processes 1;");
        out.line(format!("pid {scratch}/nginx.pid;"));
        out.line("error_log /dev/stdout info;");
        out.blank();
        out.open("events");
        out.line("worker_connections 256;");
        out.close();
        out.blank();

        out.open("http");
        out.open("types");
        for (mime, exts) in MIME_TYPES {
            out.line(format!("{mime} {exts};"));
        }
        out.close();
        out.line("default_type application/octet-stream;");
        out.line("sendfile on;");
        out.line("access_log /dev/stdout;");
        for (directive, dir) in TEMP_PATHS {
            out.line(format!("{directive} {scratch}/{dir};"));
        }
        out.line("gzip on;");
        out.line("gzip_min_length 256;");
        out.line(format!("gzip_types {};", GZIP_TYPES.join(" ")));
        out.line("absolute_redirect off;");
        out.blank();

        out.open("server");
        match self.spec.mode {
            crate::server::types::ProtocolMode::Plain => {
                out.line(format!("listen {};", self.spec.listen_addr()))
            }
            crate::server::types::ProtocolMode::Tls => {
                out.line(format!("listen {} ssl;", self.spec.listen_addr()));
                out.line(format!(
                    "ssl_certificate {};",
                    self.scratch.cert_path().display()
                ));
                out.line(format!(
                    "ssl_certificate_key {};",
                    self.scratch.key_path().display()
                ));
            }
        }
        out.line(format!("server_name {};", self.spec.host));
        out.line(format!("root {};", self.scratch.doc_root().display()));
        out.line("index index.html;");
        for route in self.routes.iter() {
            out.blank();
            render_route(&mut out, route);
        }
        out.close();
        out.close();
        out.finish()
    }
}

const MIME_TYPES: &[(&str, &str)] = &[
    ("text/html", "html htm"),
    ("text/plain", "txt"),
    ("text/css", "css"),
    ("text/xml", "xml"),
    ("application/javascript", "js"),
    ("application/json", "json"),
];

const GZIP_TYPES: &[&str] = &[
    "text/plain",
    "text/css",
    "text/xml",
    "application/json",
    "application/javascript",
    "application/xml",
];

const TEMP_PATHS: &[(&str, &str)] = &[
    ("client_body_temp_path", "client_body_temp"),
    ("proxy_temp_path", "proxy_temp"),
    ("fastcgi_temp_path", "fastcgi_temp"),
    ("uwsgi_temp_path", "uwsgi_temp"),
    ("scgi_temp_path", "scgi_temp"),
];

const JSON_OK: &str = r#"'{"status":true}'"#;
const JSON_DENIED: &str = r#"'{"status":false}'"#;

fn render_route(out: &mut Conf, route: &Route) {
    use RouteBehavior::*;

    out.open(&format!("location = {}", route.path));
    match &route.behavior {
        RedirectToRoot => out.line("return 302 /;"),
        RedirectLoop => out.line(format!("return 302 {};", route.path)),
        HeaderEcho { name, value } => {
            out.line("default_type application/json;");
            out.line(format!("add_header {name} \"{value}\" always;"));
            out.line(format!("return 200 {JSON_OK};"));
        }
        HeaderCheck { name, value } => {
            out.line("default_type application/json;");
            out.line(format!(
                "if ({} != \"{value}\") {{ return 403 {JSON_DENIED}; }}",
                header_variable(name)
            ));
            out.line(format!("return 200 {JSON_OK};"));
        }
        CookieEcho { name, value } => {
            out.line("default_type application/json;");
            out.line(format!(
                "add_header Set-Cookie \"{name}={value}; Path=/\" always;"
            ));
            out.line(format!("return 200 {JSON_OK};"));
        }
        CookieCheck { name, value } => {
            out.line("default_type application/json;");
            out.line(format!(
                "if ($cookie_{name} != \"{value}\") {{ return 403 {JSON_DENIED}; }}"
            ));
            out.line(format!("return 200 {JSON_OK};"));
        }
        MethodOnly(method) => {
            out.line("default_type text/plain;");
            out.line(format!("add_header Allow \"{method}\" always;"));
            out.line(format!("if ($request_method != {method}) {{ return 405; }}"));
            out.line("return 200 \"OK\";");
        }
        OptionsResponder { allow } => {
            let allow = allow
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            out.line(format!("add_header Allow \"{allow}\" always;"));
            out.line(format!(
                "if ($request_method != {}) {{ return 405; }}",
                HttpMethod::Options
            ));
            out.line("return 204;");
        }
        UserAgentExact(ua) => {
            out.line("default_type text/plain;");
            out.line(format!("if ($http_user_agent != \"{ua}\") {{ return 403; }}"));
            out.line("return 200 \"OK\";");
        }
        UserAgentPrefix(prefix) => {
            out.line("default_type text/plain;");
            out.line(format!(
                "if ($http_user_agent !~ \"^{}\") {{ return 403; }}",
                regex_escape(prefix)
            ));
            out.line("return 200 \"OK\";");
        }
        BasicAuth { user, password } => {
            use base64::Engine as _;
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
            out.line("default_type text/plain;");
            out.open(&format!("if ($http_authorization != \"Basic {token}\")"));
            out.line("add_header WWW-Authenticate 'Basic realm=\"harness\"' always;");
            out.line("return 401;");
            out.close();
            out.line("return 200 \"OK\";");
        }
        BearerAuth { token } => {
            out.line("default_type text/plain;");
            out.open(&format!("if ($http_authorization != \"Bearer {token}\")"));
            out.line("add_header WWW-Authenticate 'Bearer realm=\"harness\"' always;");
            out.line("return 401;");
            out.close();
            out.line("return 200 \"OK\";");
        }
    }
    out.close();
}

/// `X-Harness-Test` → `$http_x_harness_test`
fn header_variable(name: &str) -> String {
    format!("$http_{}", name.to_ascii_lowercase().replace('-', "_"))
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '.' | '^' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '|' | '/') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// nginx only honours `user` when the master runs as root, and then the
/// default (`nobody`) cannot read a private temp directory.
fn privileged_user() -> Option<String> {
    let uid = nix::unistd::geteuid();
    if !uid.is_root() {
        return None;
    }
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => Some(user.name),
        _ => Some("root".into()),
    }
}

#[derive(Default)]
struct Conf {
    text: String,
    depth: usize,
}

impl Conf {
    fn line(&mut self, line: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.text.push_str("    ");
        }
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    fn blank(&mut self) {
        self.text.push('\n');
    }

    fn open(&mut self, block: &str) {
        self.line(format!("{block} {{"));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn finish(self) -> String {
        self.text
    }
}
