//! Browser side of the reload channel.

/// Path of the server-sent events endpoint.
pub const EVENTS_PATH: &str = "/__siteforge/events";

/// Path the client script is served from.
pub const CLIENT_PATH: &str = "/__siteforge/client.js";

/// Marker attribute on the injected tag; a page carrying it is left alone.
const MARKER: &str = "data-siteforge-client";

/// Listens on the events endpoint. `reload` refreshes the page, `css`
/// re-fetches matching stylesheets with a cache-busting query, `error` and
/// `clear-error` toggle a full-screen overlay.
pub const CLIENT_JS: &str = r#"(function () {
  var OVERLAY_ID = "__siteforge-overlay";
  var source = new EventSource("/__siteforge/events");

  function swapStylesheets(paths) {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var stamp = "siteforge=" + Date.now();
    for (var i = 0; i < links.length; i++) {
      var url = new URL(links[i].href, location.href);
      if (url.origin !== location.origin) continue;
      if (paths.length && paths.indexOf(url.pathname) === -1) continue;
      url.search = stamp;
      links[i].href = url.toString();
    }
  }

  function showError(message) {
    var overlay = document.getElementById(OVERLAY_ID);
    if (!overlay) {
      overlay = document.createElement("pre");
      overlay.id = OVERLAY_ID;
      overlay.style.cssText =
        "position:fixed;inset:0;margin:0;padding:24px;z-index:2147483647;" +
        "overflow:auto;background:rgba(24,24,24,.94);color:#ff8080;" +
        "font:14px/1.5 monospace;white-space:pre-wrap";
      document.body.appendChild(overlay);
    }
    overlay.textContent = message;
  }

  function clearError() {
    var overlay = document.getElementById(OVERLAY_ID);
    if (overlay) overlay.remove();
  }

  source.addEventListener("reload", function () {
    location.reload();
  });
  source.addEventListener("css", function (ev) {
    swapStylesheets(JSON.parse(ev.data).paths || []);
  });
  source.addEventListener("error", function (ev) {
    if (ev.data) showError(JSON.parse(ev.data).message);
  });
  source.addEventListener("clear-error", clearError);
})();
"#;

/// Insert the client `<script>` before the last `</body>`, or append it
/// when the page has none.
pub fn inject(html: &str) -> String {
    if html.contains(MARKER) {
        return html.to_string();
    }

    let tag = format!("<script {}=\"1\" src=\"{}\"></script>", MARKER, CLIENT_PATH);
    let mut out = String::with_capacity(html.len() + tag.len());
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            out.push_str(&html[..idx]);
            out.push_str(&tag);
            out.push_str(&html[idx..]);
        }
        None => {
            out.push_str(html);
            out.push_str(&tag);
        }
    }
    out
}
