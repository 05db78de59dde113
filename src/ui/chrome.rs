//! Chrome DevTools implementation of [`UiAutomation`].
//!
//! Elements are addressed through marker attributes written by page scripts, so a
//! handle from an earlier discovery stops resolving once the rows are re-tagged.

use super::{Condition, ElementRef, RowHandle, UiAutomation, UiError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HANDLER_ERROR_TOLERANCE: usize = 3;

/// Shared by every page script.
const VISIBLE_FN: &str = "const visible = (el) => !!el \
    && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length) \
    && getComputedStyle(el).visibility !== 'hidden';";

const MODAL_PRESENT_EXPR: &str =
    "Array.from(document.querySelectorAll('.modal.show, .modal-body, [role=\"dialog\"]')).some(visible)";

/// How to obtain an authenticated browser.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Attach to a running browser instead of launching one.
    pub ws_url: Option<String>,
    /// Profile that already holds the logged-in session.
    pub profile_dir: Option<PathBuf>,
    pub chrome_bin: Option<PathBuf>,
    pub headless: bool,
    pub op_timeout: Duration,
}

pub struct ChromeUi {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    owned: bool,
    generation: u64,
    op_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RowEval {
    position: usize,
    #[serde(default)]
    first_cell: String,
    tag: String,
    visible: bool,
}

#[derive(Debug, Deserialize)]
struct ElementEval<T> {
    found: bool,
    value: Option<T>,
}

impl ChromeUi {
    /// Launch (or attach to) Chromium and open a blank working page.
    pub async fn start(opts: &ChromeOptions) -> Result<Self> {
        let (browser, mut handler, owned) = match opts.ws_url.as_deref() {
            Some(url) => {
                info!(%url, "attaching to running browser");
                let (b, h) = Browser::connect(url)
                    .await
                    .with_context(|| format!("connect to browser at {url}"))?;
                (b, h, false)
            }
            None => {
                let mut builder = BrowserConfig::builder()
                    .window_size(1920, 1080)
                    .no_sandbox()
                    .args(vec![
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        "--disable-extensions",
                    ]);
                if opts.headless {
                    builder = builder.new_headless_mode();
                } else {
                    builder = builder.with_head();
                }
                if let Some(dir) = opts.profile_dir.as_ref() {
                    builder = builder.user_data_dir(dir);
                }
                if let Some(bin) = opts.chrome_bin.as_ref() {
                    builder = builder.chrome_executable(bin);
                }
                let cfg = builder
                    .build()
                    .map_err(|e| anyhow::anyhow!("browser config: {e}"))?;
                info!(headless = opts.headless, "launching chromium");
                let (b, h) = Browser::launch(cfg).await.context("launch chromium")?;
                (b, h, true)
            }
        };

        let handler = tokio::spawn(async move {
            let mut consecutive_errors = 0usize;
            while let Some(event) = handler.next().await {
                match event {
                    Ok(()) => consecutive_errors = 0,
                    Err(err) => {
                        consecutive_errors += 1;
                        warn!(%err, consecutive_errors, "cdp handler error");
                        if consecutive_errors >= HANDLER_ERROR_TOLERANCE {
                            break;
                        }
                    }
                }
            }
            debug!("cdp handler loop ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("open working page")?;

        Ok(Self {
            browser,
            page,
            handler,
            owned,
            generation: 0,
            op_timeout: opts.op_timeout,
        })
    }

    /// Navigate to the novelties listing and make sure the session is authenticated.
    pub async fn open(&mut self, url: &str) -> std::result::Result<(), UiError> {
        let nav = async {
            self.page.goto(url).await?.wait_for_navigation().await?;
            Ok::<_, CdpError>(())
        };
        tokio::time::timeout(self.op_timeout, nav)
            .await
            .map_err(|_| UiError::Timeout(self.op_timeout))?
            .map_err(map_cdp_error)?;

        let current = self
            .page
            .url()
            .await
            .map_err(map_cdp_error)?
            .unwrap_or_default();
        let body: String = self
            .eval("(() => (document.body && document.body.innerText || '').toLowerCase())()")
            .await?;
        if looks_unauthenticated(&current, &body) {
            return Err(UiError::SessionLost(format!(
                "not authenticated (landed on {current})"
            )));
        }
        info!(url = %current, "novelties page open");

        if !self
            .wait_for_any(&[Condition::RowsPresent], self.op_timeout)
            .await?
        {
            warn!("novelties table not rendered yet, continuing");
        }
        Ok(())
    }

    /// Close the browser if we launched it; an attached browser is left running.
    pub async fn shutdown(mut self) {
        if self.owned {
            if let Err(e) = self.browser.close().await {
                warn!(error = %e, "closing browser failed");
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
    }

    async fn eval<T: DeserializeOwned>(&self, script: impl Into<String>) -> Result<T, UiError> {
        let script: String = script.into();
        let result = tokio::time::timeout(self.op_timeout, self.page.evaluate(script))
            .await
            .map_err(|_| UiError::Timeout(self.op_timeout))?
            .map_err(map_cdp_error)?;
        result
            .into_value::<T>()
            .map_err(|e| UiError::Script(format!("decode failed: {e}")))
    }

    /// Run `body` against the element behind `el`; `body` must assign `value`.
    async fn with_element<T: DeserializeOwned>(
        &self,
        el: &ElementRef,
        body: &str,
    ) -> Result<T, UiError> {
        let script = format!(
            "(() => {{ {VISIBLE_FN} const el = document.querySelector({sel}); \
             if (!el) return {{ found: false }}; let value = null; {body} \
             return {{ found: true, value: value }}; }})()",
            sel = js_str(el.selector()),
        );
        let eval: ElementEval<T> = self.eval(script).await?;
        match (eval.found, eval.value) {
            (true, Some(v)) => Ok(v),
            (true, None) => Err(UiError::Script(format!("no result for {el}"))),
            (false, _) => Err(UiError::ElementNotFound(el.to_string())),
        }
    }

    fn next_tag(&mut self, prefix: &str) -> String {
        self.generation += 1;
        format!("{prefix}{}", self.generation)
    }
}

#[async_trait]
impl UiAutomation for ChromeUi {
    async fn find_actionable_rows(&mut self) -> Result<Vec<RowHandle>, UiError> {
        let generation = self.next_tag("g");
        let script = format!(
            "(() => {{ \
               document.querySelectorAll('[data-nb-row]').forEach(e => e.removeAttribute('data-nb-row')); \
               const out = []; \
               {VISIBLE_FN} \
               document.querySelectorAll('table tbody tr').forEach((tr, i) => {{ \
                 const btn = tr.querySelector('button.btn-success'); \
                 if (!btn || btn.disabled) return; \
                 const tag = {generation} + '-' + i; \
                 btn.setAttribute('data-nb-row', tag); \
                 const cell = tr.querySelector('td'); \
                 out.push({{ position: i, first_cell: cell ? cell.innerText.trim() : '', tag: tag, visible: visible(btn) }}); \
               }}); \
               return out; \
             }})()",
            generation = js_str(&generation),
        );
        let rows: Vec<RowEval> = self.eval(script).await?;
        Ok(rows
            .into_iter()
            .map(|r| RowHandle {
                position: r.position,
                first_cell: Some(r.first_cell).filter(|c| !c.is_empty()),
                visible: r.visible,
                action: ElementRef::new(format!("[data-nb-row=\"{}\"]", r.tag)),
            })
            .collect())
    }

    async fn is_visible(&mut self, el: &ElementRef) -> Result<bool, UiError> {
        self.with_element(el, "value = visible(el);").await
    }

    async fn click(&mut self, el: &ElementRef) -> Result<(), UiError> {
        let _: bool = self
            .with_element(
                el,
                "el.scrollIntoView({ block: 'center' }); el.click(); value = true;",
            )
            .await?;
        Ok(())
    }

    async fn set_value(&mut self, el: &ElementRef, value: &str) -> Result<(), UiError> {
        // Native setter so framework-bound inputs observe the change.
        let body = format!(
            "el.scrollIntoView({{ block: 'center' }}); el.click(); el.focus(); \
             const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
             const setter = Object.getOwnPropertyDescriptor(proto, 'value').set; \
             setter.call(el, ''); setter.call(el, {v}); \
             ['input', 'change', 'blur'].forEach(t => el.dispatchEvent(new Event(t, {{ bubbles: true }}))); \
             value = true;",
            v = js_str(value),
        );
        let _: bool = self.with_element(el, &body).await?;
        Ok(())
    }

    async fn wait_for_any(
        &mut self,
        conditions: &[Condition],
        timeout: Duration,
    ) -> Result<bool, UiError> {
        if conditions.is_empty() {
            return Ok(false);
        }
        let exprs: Vec<String> = conditions.iter().map(condition_expr).collect();
        let script = format!(
            "(() => {{ {VISIBLE_FN} return [{}].some(Boolean); }})()",
            exprs.join(", ")
        );
        let deadline = Instant::now() + timeout;
        loop {
            if self.eval::<bool>(script.clone()).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find_control(&mut self, labels: &[&str]) -> Result<Option<ElementRef>, UiError> {
        let tag = self.next_tag("c");
        let script = format!(
            "(() => {{ {VISIBLE_FN} \
               document.querySelectorAll('[data-nb-ctl]').forEach(e => e.removeAttribute('data-nb-ctl')); \
               const buttons = Array.from(document.querySelectorAll('button')).filter(visible); \
               for (const label of {labels}) {{ \
                 const needle = label.toUpperCase(); \
                 const hit = buttons.find(b => (b.innerText || '').toUpperCase().includes(needle)); \
                 if (hit) {{ hit.setAttribute('data-nb-ctl', {tag}); return {tag}; }} \
               }} \
               return ''; \
             }})()",
            labels = js_labels(labels),
            tag = js_str(&tag),
        );
        let found: String = self.eval(script).await?;
        Ok(Some(found)
            .filter(|t| !t.is_empty())
            .map(|t| ElementRef::new(format!("[data-nb-ctl=\"{t}\"]"))))
    }

    async fn find_field(&mut self, labels: &[&str]) -> Result<Option<ElementRef>, UiError> {
        let tag = self.next_tag("f");
        let script = format!(
            "(() => {{ {VISIBLE_FN} \
               const inputs = Array.from(document.querySelectorAll('input, textarea')) \
                 .filter(el => visible(el) && el.type !== 'hidden' && !el.disabled); \
               const mark = (el) => {{ \
                 document.querySelectorAll('[data-nb-field]').forEach(e => e.removeAttribute('data-nb-field')); \
                 el.setAttribute('data-nb-field', {tag}); return {tag}; \
               }}; \
               for (const label of {labels}) {{ \
                 const lower = label.toLowerCase(); \
                 let hit = inputs.find(el => (el.id || '').toLowerCase().includes(lower) \
                   || (el.name || '').toLowerCase().includes(lower)); \
                 if (!hit) hit = inputs.find(el => (el.placeholder || '').includes(label)); \
                 if (!hit) {{ \
                   const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT); \
                   let node; \
                   while (!hit && (node = walker.nextNode())) {{ \
                     if (!node.textContent.includes(label)) continue; \
                     const anchor = node.parentElement; \
                     if (!anchor || !visible(anchor)) continue; \
                     hit = inputs.find(el => anchor.compareDocumentPosition(el) & Node.DOCUMENT_POSITION_FOLLOWING); \
                   }} \
                 }} \
                 if (hit) return mark(hit); \
               }} \
               return ''; \
             }})()",
            labels = js_labels(labels),
            tag = js_str(&tag),
        );
        let found: String = self.eval(script).await?;
        Ok(Some(found)
            .filter(|t| !t.is_empty())
            .map(|t| ElementRef::new(format!("[data-nb-field=\"{t}\"]"))))
    }

    async fn current_surface_text(&mut self) -> Result<String, UiError> {
        let script = format!(
            "(() => {{ {VISIBLE_FN} \
               const modal = Array.from(document.querySelectorAll('.modal-body')).find(visible); \
               const root = modal || document.body; \
               return (root && root.innerText) || ''; \
             }})()"
        );
        self.eval(script).await
    }

    async fn close_extra_surfaces(&mut self) -> Result<u32, UiError> {
        let pages = tokio::time::timeout(self.op_timeout, self.browser.pages())
            .await
            .map_err(|_| UiError::Timeout(self.op_timeout))?
            .map_err(map_cdp_error)?;
        let main = self.page.target_id().clone();
        let mut closed = 0;
        for page in pages {
            if page.target_id() == &main {
                continue;
            }
            match page.close().await {
                Ok(()) => closed += 1,
                Err(e) => warn!(error = %e, "failed to close extra tab"),
            }
        }
        if closed > 0 {
            self.page.bring_to_front().await.map_err(map_cdp_error)?;
            info!(closed, "closed extra tabs");
        }
        Ok(closed)
    }

    async fn engage_page_size(&mut self, size: u32) -> Result<bool, UiError> {
        let script = format!(
            "(() => {{ \
               window.scrollTo(0, document.body.scrollHeight); \
               const pick = (q) => Array.from(document.querySelectorAll(q)); \
               let selects = pick('select#select.custom-select'); \
               if (!selects.length) selects = pick('select.custom-select, select.form-control'); \
               if (!selects.length) selects = pick('select'); \
               let engaged = false; \
               if (selects.length) {{ \
                 const sel = selects[0]; \
                 const want = {size}; \
                 const opt = Array.from(sel.options).find(o => o.text.trim() === want) \
                   || Array.from(sel.options).find(o => o.text.includes(want) || o.value.includes(want)); \
                 if (opt) {{ \
                   sel.value = opt.value; \
                   sel.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                   engaged = true; \
                 }} \
               }} \
               window.scrollTo(0, 0); \
               return engaged; \
             }})()",
            size = js_str(&size.to_string()),
        );
        let engaged: bool = self.eval(script).await?;
        if engaged
            && !self
                .wait_for_any(&[Condition::RowsPresent], self.op_timeout)
                .await?
        {
            warn!(size, "rows did not reload after changing page size");
        }
        Ok(engaged)
    }
}

fn condition_expr(c: &Condition) -> String {
    match c {
        Condition::ModalPresent => MODAL_PRESENT_EXPR.to_string(),
        Condition::ModalDismissed => format!("!({MODAL_PRESENT_EXPR})"),
        Condition::ControlLabeled(labels) => format!(
            "Array.from(document.querySelectorAll('button')).filter(visible)\
             .some(b => {}.some(l => (b.innerText || '').toUpperCase().includes(l.toUpperCase())))",
            js_labels(labels)
        ),
        Condition::RowsPresent => "document.querySelectorAll('table tbody tr').length > 0".into(),
    }
}

/// Transport-level failures mean the browser is gone; everything else is per-call.
fn map_cdp_error(e: CdpError) -> UiError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("receiver is gone")
        || lower.contains("channel closed")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("websocket")
    {
        UiError::SessionLost(msg)
    } else if lower.contains("timeout") {
        UiError::Script(format!("cdp timeout: {msg}"))
    } else {
        UiError::Script(msg)
    }
}

fn looks_unauthenticated(url: &str, body_lower: &str) -> bool {
    url.to_lowercase().contains("login")
        || ["registro", "crear cuenta", "registrarme"]
            .iter()
            .any(|marker| body_lower.contains(marker))
}

fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}

fn js_labels(labels: &[&str]) -> String {
    serde_json::Value::Array(
        labels
            .iter()
            .map(|l| serde_json::Value::String((*l).to_owned()))
            .collect(),
    )
    .to_string()
}
