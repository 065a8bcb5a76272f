use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use stencil_core::{
    ChangeDetector, DetectorConfig, EventLoop, SharedScope, Subscription, TimerId, shared,
};
use stencil_dom::{Document, Dom, NodeId};
use stencil_expr::Functions;
use stencil_runtime::{SharedDom, TemplateInstance};
use stencil_template::{CompiledBuilder, Compiler, CompilerConfig};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "STENCIL_LOG";

fn read_template(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Load a JSON scope file; no file means an empty object.
pub fn read_scope(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Object(Default::default()));
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn compile(template: &Path, prefix: Option<&str>) -> Result<CompiledBuilder> {
    let src = read_template(template)?;
    let mut config = CompilerConfig::default();
    if let Some(prefix) = prefix {
        config = config.with_attr_prefix(prefix);
    }
    Compiler::new(config)
        .compile_str(&src)
        .with_context(|| format!("failed to compile {}", template.display()))
}

/// Render `template` once against the scope file and return the HTML.
pub fn render_cmd(template: &Path, scope: Option<&Path>, prefix: Option<&str>) -> Result<String> {
    let builder = compile(template, prefix)?;
    let scope = shared(read_scope(scope)?);
    let mut doc = Document::new();
    let fragment = builder
        .build(&mut doc, &scope, &Rc::new(Functions::with_builtins()))
        .with_context(|| format!("failed to render {}", template.display()))?;
    Ok(doc.inner_html(fragment))
}

/// Compile `template` and return its instruction outline.
pub fn check_cmd(template: &Path, prefix: Option<&str>) -> Result<String> {
    Ok(compile(template, prefix)?.outline())
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Stop after this long; `None` runs until interrupted.
    pub duration: Option<Duration>,
    pub prefix: Option<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            duration: None,
            prefix: None,
        }
    }
}

/// Observes a scope file and re-renders a template whenever its content changes.
pub struct Watcher {
    event_loop: EventLoop,
    dom: SharedDom,
    mount: NodeId,
    interval: Duration,
    last: String,
    reload: TimerId,
    _instance: TemplateInstance,
    _subscription: Subscription,
}

impl Watcher {
    pub fn new(template: &Path, scope_path: &Path, opts: &WatchOptions) -> Result<Self> {
        if opts.interval.is_zero() {
            bail!("watch interval must be positive");
        }
        let builder = compile(template, opts.prefix.as_deref())?;
        let scope = shared(read_scope(Some(scope_path))?);

        let dom: SharedDom = Rc::new(RefCell::new(Document::new()));
        let mount = {
            let mut doc = dom.borrow_mut();
            let mount = doc.create_element("main", None);
            let root = doc.root();
            doc.append_child(root, mount)?;
            mount
        };

        let event_loop = EventLoop::new();
        // registered before the detector so a reload is seen by the same tick's poll
        let reload = event_loop.set_interval(opts.interval, {
            let scope = scope.clone();
            let path = scope_path.to_path_buf();
            move || reload_scope(&path, &scope)
        });

        let detector = ChangeDetector::with_config(
            event_loop.clone(),
            DetectorConfig {
                poll_interval: opts.interval,
            },
        );
        let mut instance = TemplateInstance::from_parts(
            builder,
            dom.clone(),
            Rc::new(Functions::with_builtins()),
            detector,
        );
        instance.render_in(mount)?;
        let subscription = instance
            .observe(scope)
            .with_context(|| format!("failed to render {}", template.display()))?;

        let last = dom.borrow().inner_html(mount);
        Ok(Self {
            event_loop,
            dom,
            mount,
            interval: opts.interval,
            last,
            reload,
            _instance: instance,
            _subscription: subscription,
        })
    }

    /// Markup currently rendered.
    pub fn html(&self) -> &str {
        &self.last
    }

    /// Advance one interval on the virtual clock. Returns the new markup if it changed.
    pub fn tick(&mut self) -> Option<String> {
        self.event_loop.advance(self.interval);
        self.take_change()
    }

    /// Run in real time, writing the initial render and every change to `out`.
    /// Returns the number of renders written.
    pub fn run(&mut self, duration: Option<Duration>, out: &mut dyn Write) -> Result<usize> {
        writeln!(out, "{}", self.last)?;
        let mut renders = 1;
        let mut elapsed = Duration::ZERO;
        while duration.is_none_or(|d| elapsed < d) {
            self.event_loop.run_for(self.interval);
            elapsed += self.interval;
            if let Some(html) = self.take_change() {
                writeln!(out, "{html}")?;
                out.flush()?;
                renders += 1;
            }
        }
        Ok(renders)
    }

    fn take_change(&mut self) -> Option<String> {
        let html = self.dom.borrow().inner_html(self.mount);
        if html == self.last {
            return None;
        }
        self.last = html.clone();
        Some(html)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.event_loop.clear(self.reload);
    }
}

fn reload_scope(path: &Path, scope: &SharedScope) {
    let value = match read_scope(Some(path)) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "keeping previous scope");
            return;
        }
    };
    if let Ok(mut current) = scope.try_borrow_mut() {
        if *current != value {
            tracing::info!(path = %path.display(), "scope file changed");
            *current = value;
        }
    }
}

/// Watch `scope` and write each render of `template` to `out`.
pub fn watch_cmd(
    template: &Path,
    scope: &Path,
    opts: &WatchOptions,
    out: &mut dyn Write,
) -> Result<usize> {
    let mut watcher = Watcher::new(template, scope, opts)?;
    watcher.run(opts.duration, out)
}
