//! Scripts injected into the browser
//!
//! `HOST_*` scripts run in the top-level blank page; `FRAME_*` scripts run
//! inside the embedded tool after switching into frame 0. Elements handed out
//! by `FRAME_QUERY` are tagged with `data-itc-id` so later scripts can find
//! them again; a script that cannot find its element returns `false`.

/// Insert the sandboxed iframe. Args: url, sandbox attribute, visible.
pub(crate) const HOST_MOUNT: &str = r"
const [url, sandbox, visible] = arguments;
window.__itcLoaded = false;
window.__itcMessages = [];
window.__itcToolOrigin = new URL(url, location.href).origin;
const frame = document.createElement('iframe');
frame.setAttribute('sandbox', sandbox);
if (!visible) { frame.setAttribute('aria-hidden', 'true'); }
frame.style.cssText = visible
  ? 'width:100%;height:100vh;border:0;'
  : 'position:absolute;left:-10000px;top:0;width:1280px;height:960px;border:0;';
frame.addEventListener('load', () => { window.__itcLoaded = true; });
frame.src = url;
document.body.appendChild(frame);
return true;
";

pub(crate) const HOST_LOADED: &str = "return window.__itcLoaded === true;";

/// Queue every message posted to the host page.
///
/// A sandboxed frame without same-origin trust posts with origin `"null"`;
/// messages whose source is our own frame are reported under the tool's
/// origin instead. Any other `"null"` sender stays `"null"`.
pub(crate) const HOST_LISTEN: &str = r"
if (!window.__itcListener) {
  window.__itcMessages = [];
  window.__itcListener = (event) => {
    const frame = document.querySelector('iframe');
    const fromTool = !!frame && event.source === frame.contentWindow;
    const origin = event.origin === 'null' && fromTool ? window.__itcToolOrigin : event.origin;
    let data = event.data;
    try { data = JSON.parse(JSON.stringify(data)); } catch (e) { data = String(data); }
    window.__itcMessages.push({ origin, data });
  };
  window.addEventListener('message', window.__itcListener);
}
return true;
";

pub(crate) const HOST_UNLISTEN: &str = r"
if (window.__itcListener) {
  window.removeEventListener('message', window.__itcListener);
  window.__itcListener = null;
}
window.__itcMessages = [];
return true;
";

pub(crate) const HOST_DRAIN_MESSAGES: &str =
    "return (window.__itcMessages || []).splice(0);";

/// Post the file to the frame. Args: name, media type, base64 bytes, target origin.
///
/// The message goes to our frame's window object, so `"*"` only relaxes the
/// origin check, never the recipient.
pub(crate) const HOST_POST_FILE: &str = r"
const [name, type, data, origin] = arguments;
const frame = document.querySelector('iframe');
if (!frame || !frame.contentWindow) { return false; }
const raw = atob(data);
const bytes = new Uint8Array(raw.length);
for (let i = 0; i < raw.length; i++) { bytes[i] = raw.charCodeAt(i); }
const file = new File([bytes], name, { type });
frame.contentWindow.postMessage({ type: 'file', data: { file, name, type } }, origin);
return true;
";

pub(crate) const FRAME_TEXT: &str =
    "return document.body ? document.body.innerText : '';";

/// Snapshot elements matching a selector. Args: selector.
pub(crate) const FRAME_QUERY: &str = r"
const [selector] = arguments;
window.__itcNext = window.__itcNext || 0;
return Array.from(document.querySelectorAll(selector)).map((el) => {
  if (!el.dataset.itcId) { el.dataset.itcId = 'itc-' + (++window.__itcNext); }
  const label = (el.innerText || el.value || el.getAttribute('aria-label') || '').trim();
  const style = window.getComputedStyle(el);
  return {
    id: el.dataset.itcId,
    tag: el.tagName.toLowerCase(),
    label,
    className: typeof el.className === 'string' ? el.className : '',
    elementId: el.id || '',
    background: style ? style.backgroundColor : null,
  };
});
";

/// Shared prelude: resolve the element and rebuild the file.
/// Args: element id, name, media type, base64 bytes.
const FILE_PRELUDE: &str = r"
const [id, name, type, data] = arguments;
const el = document.querySelector('[data-itc-id=' + JSON.stringify(id) + ']');
if (!el) { return false; }
const raw = atob(data);
const bytes = new Uint8Array(raw.length);
for (let i = 0; i < raw.length; i++) { bytes[i] = raw.charCodeAt(i); }
const file = new File([bytes], name, { type });
const transfer = new DataTransfer();
transfer.items.add(file);
";

pub(crate) fn frame_drop_file() -> String {
    format!(
        "{FILE_PRELUDE}
for (const kind of ['dragenter', 'dragover', 'drop']) {{
  el.dispatchEvent(new DragEvent(kind, {{ bubbles: true, cancelable: true, dataTransfer: transfer }}));
}}
return true;"
    )
}

pub(crate) fn frame_assign_file() -> String {
    format!(
        "{FILE_PRELUDE}
el.files = transfer.files;
return true;"
    )
}

/// Args: element id.
pub(crate) const FRAME_CHANGE: &str = r"
const el = document.querySelector('[data-itc-id=' + JSON.stringify(arguments[0]) + ']');
if (!el) { return false; }
el.dispatchEvent(new Event('change', { bubbles: true }));
return true;
";

/// Args: element id.
pub(crate) const FRAME_CLICK: &str = r"
const el = document.querySelector('[data-itc-id=' + JSON.stringify(arguments[0]) + ']');
if (!el) { return false; }
el.click();
return true;
";

/// Record links that are clicked or inserted with a `download` attribute or
/// a `blob:` href.
pub(crate) const FRAME_WATCH_DOWNLOADS: &str = r"
window.__itcDownloads = [];
const record = (a) => {
  if (!a || !a.href) { return; }
  if (a.hasAttribute('download') || a.href.startsWith('blob:') || a.href.startsWith('data:')) {
    window.__itcDownloads.push({ href: a.href, filename: a.getAttribute('download') || null });
  }
};
if (!window.__itcOriginalClick) {
  window.__itcOriginalClick = HTMLAnchorElement.prototype.click;
  HTMLAnchorElement.prototype.click = function () {
    record(this);
    if (!(this.hasAttribute('download') || this.href.startsWith('blob:'))) {
      return window.__itcOriginalClick.call(this);
    }
  };
}
window.__itcObserver = new MutationObserver((mutations) => {
  for (const m of mutations) {
    for (const node of m.addedNodes) {
      if (node.tagName === 'A') { record(node); }
    }
  }
});
window.__itcObserver.observe(document.documentElement, { childList: true, subtree: true });
return true;
";

pub(crate) const FRAME_UNWATCH_DOWNLOADS: &str = r"
if (window.__itcObserver) { window.__itcObserver.disconnect(); window.__itcObserver = null; }
if (window.__itcOriginalClick) {
  HTMLAnchorElement.prototype.click = window.__itcOriginalClick;
  window.__itcOriginalClick = null;
}
window.__itcDownloads = [];
return true;
";

pub(crate) const FRAME_DRAIN_DOWNLOADS: &str =
    "return (window.__itcDownloads || []).splice(0);";

/// Read a reference as base64. Args: href, then the async callback.
pub(crate) const FRAME_FETCH: &str = r"
const [href, done] = arguments;
fetch(href)
  .then((response) => response.blob().then((blob) => {
    const reader = new FileReader();
    reader.onload = () => done({
      ok: response.ok,
      status: response.status,
      type: blob.type || null,
      data: String(reader.result).split(',')[1] || '',
    });
    reader.onerror = () => done({ error: 'could not read response body' });
    reader.readAsDataURL(blob);
  }))
  .catch((e) => done({ error: String(e) }));
";
