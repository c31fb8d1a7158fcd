//! Bootstrap script generation.
//!
//! The script is evaluated inside a viewer once the connector landing page
//! has loaded. It wipes the page, mounts the display container, loads the
//! DCV web client SDK and opens the connection with the record's
//! credentials. Every string taken from a record is embedded as a
//! single-quoted literal produced by [`escape_script_literal`].

use serde::{Deserialize, Serialize};

use crate::viewer::record::SessionRecord;

/// Tunables for the generated script that do not vary per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
    /// ES module URL of the DCV web client SDK.
    pub sdk_url: String,
    /// Port appended to bare host names.
    #[serde(default = "default_dcv_port")]
    pub dcv_port: u16,
    /// Id of the element the SDK renders into.
    #[serde(default = "default_mount_id")]
    pub mount_id: String,
    /// Shell command the script invokes to report SDK status back.
    #[serde(default = "default_status_command")]
    pub status_command: String,
}

fn default_dcv_port() -> u16 { 8443 }
fn default_mount_id() -> String { "dcv-display".to_string() }
fn default_status_command() -> String { "report_viewer_status".to_string() }

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            sdk_url: "dcvjs/dcv.js".to_string(),
            dcv_port: default_dcv_port(),
            mount_id: default_mount_id(),
            status_command: default_status_command(),
        }
    }
}

/// Escape `value` for use inside a single-quoted script string literal.
///
/// `\` `'` `"` and line feeds are backslash-escaped, carriage returns are
/// dropped. Everything else is copied verbatim.
pub fn escape_script_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Generate the bootstrap script for `record`.
///
/// Pure: the output depends only on the record's identity and credential
/// fields and on `options`.
pub fn build_connection_script(record: &SessionRecord, options: &ScriptOptions) -> String {
    let instance_id = escape_script_literal(record.instance_id());
    let host_name = escape_script_literal(record.host_name());
    let session_token = escape_script_literal(record.session_token());
    let session_id = escape_script_literal(record.session_id());
    let sdk_url = escape_script_literal(&options.sdk_url);
    let mount_id = escape_script_literal(&options.mount_id);
    let status_command = escape_script_literal(&options.status_command);
    let viewer_id = record.viewer_id();
    let dcv_port = options.dcv_port;

    format!(
        r#"(function () {{
  'use strict';
  var instanceId = '{instance_id}';
  var viewerId = {viewer_id};
  var hostName = '{host_name}';
  var sessionToken = '{session_token}';
  var sessionId = '{session_id}';
  var sdkUrl = '{sdk_url}';
  var mountId = '{mount_id}';
  var statusCommand = '{status_command}';
  var dcvPort = {dcv_port};

  function report(status, message) {{
    try {{
      var ipc = window.__TAURI_INTERNALS__;
      if (ipc && typeof ipc.invoke === 'function') {{
        ipc.invoke(statusCommand, {{
          instanceId: instanceId,
          viewerId: viewerId,
          status: status,
          message: message == null ? null : String(message)
        }});
      }}
    }} catch (e) {{}}
  }}

  document.head.innerHTML = '';
  document.body.innerHTML = '';
  document.body.style.cssText = 'margin:0;padding:0;overflow:hidden;background:#000;';

  var mount = document.createElement('div');
  mount.id = mountId;
  mount.style.cssText = 'position:absolute;top:0;left:0;right:0;bottom:0;';
  document.body.appendChild(mount);

  var overlay = document.createElement('div');
  overlay.style.cssText = 'position:absolute;top:0;left:0;right:0;bottom:0;display:flex;' +
    'align-items:center;justify-content:center;font:14px sans-serif;color:#ddd;background:#111;z-index:10;';
  document.body.appendChild(overlay);

  function showOverlay(text, isError) {{
    overlay.textContent = text;
    overlay.style.color = isError ? '#ff6b6b' : '#ddd';
    overlay.style.display = 'flex';
  }}

  function hideOverlay() {{
    overlay.style.display = 'none';
  }}

  showOverlay('Connecting\u2026', false);

  var connection = null;
  var url = hostName.indexOf('://') >= 0 ? hostName : 'https://' + hostName + ':' + dcvPort;

  import(sdkUrl).then(function (module) {{
    var dcv = module.default || module;
    return dcv.connect({{
      url: url,
      sessionId: sessionId,
      authToken: sessionToken,
      divId: mountId,
      callbacks: {{
        firstFrame: function () {{
          hideOverlay();
          report('firstFrame');
        }},
        disconnect: function (reason) {{
          var text = reason && reason.message ? reason.message : 'Disconnected';
          showOverlay('Disconnected: ' + text, false);
          report('disconnected', text);
        }}
      }}
    }});
  }}).then(function (conn) {{
    connection = conn;
  }}).catch(function (err) {{
    var text = err && err.message ? err.message : String(err);
    showOverlay('Connection failed: ' + text, true);
    report('connectFailed', text);
  }});

  window.addEventListener('resize', function () {{
    if (!connection) {{
      return;
    }}
    try {{
      connection.requestResolution(window.innerWidth, window.innerHeight);
    }} catch (e) {{}}
  }});
}})();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::types::OpenRequest;

    fn record(host: &str, token: &str, session: &str) -> SessionRecord {
        SessionRecord::new(OpenRequest::new("vm-1", "Dev Box", host, token, session), 7)
    }

    /// Inverse of [`escape_script_literal`] (modulo the dropped carriage
    /// returns).
    fn unescape_script_literal(escaped: &str) -> String {
        let mut out = String::with_capacity(escaped.len());
        let mut chars = escaped.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }

    /// Pull the raw (still escaped) literal assigned to `var <name> = '...'`.
    fn literal<'a>(script: &'a str, name: &str) -> &'a str {
        let marker = format!("var {} = '", name);
        let start = script.find(&marker).expect("variable present") + marker.len();
        let bytes = script.as_bytes();
        let mut i = start;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'\'' => break,
                _ => i += 1,
            }
        }
        &script[start..i]
    }

    #[test]
    fn escapes_each_special_character() {
        assert_eq!(escape_script_literal(r"a\b"), r"a\\b");
        assert_eq!(escape_script_literal("it's"), r"it\'s");
        assert_eq!(escape_script_literal(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_script_literal("one\ntwo"), r"one\ntwo");
        assert_eq!(escape_script_literal("crlf\r\n"), r"crlf\n");
        assert_eq!(escape_script_literal("plain-token_123"), "plain-token_123");
    }

    #[test]
    fn unescape_inverts_escape() {
        for value in ["", "x", r"\\'", "a'b\"c\\d\ne", "'; alert(1); //", "\\n literally"] {
            assert_eq!(unescape_script_literal(&escape_script_literal(value)), value);
        }
    }

    #[test]
    fn embedded_fields_round_trip() {
        let host = "evil'host\"\\name\n";
        let token = "tok'; window.location='x'; //";
        let session = "sess\\9\n\"";
        let script = build_connection_script(&record(host, token, session), &ScriptOptions::default());

        assert_eq!(unescape_script_literal(literal(&script, "hostName")), host);
        assert_eq!(unescape_script_literal(literal(&script, "sessionToken")), token);
        assert_eq!(unescape_script_literal(literal(&script, "sessionId")), session);
        assert_eq!(unescape_script_literal(literal(&script, "instanceId")), "vm-1");
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let script = build_connection_script(&record("h\r\nost", "t", "s"), &ScriptOptions::default());
        assert_eq!(unescape_script_literal(literal(&script, "hostName")), "h\nost");
        assert!(!script.contains('\r'));
    }

    #[test]
    fn contains_quoted_credentials_and_sdk_wiring() {
        let script = build_connection_script(
            &record("vm1.example.com", "tok123", "sess9"),
            &ScriptOptions::default(),
        );
        assert!(script.contains("var sessionToken = 'tok123';"));
        assert!(script.contains("var sessionId = 'sess9';"));
        assert!(script.contains("var hostName = 'vm1.example.com';"));
        assert!(script.contains("var viewerId = 7;"));
        assert!(script.contains("var dcvPort = 8443;"));
        assert!(script.contains("import(sdkUrl)"));
        assert!(script.contains("firstFrame: function"));
        assert!(script.contains("disconnect: function"));
        assert!(script.contains(".catch(function (err)"));
        assert!(script.contains("requestResolution(window.innerWidth, window.innerHeight)"));
        assert!(script.contains("'report_viewer_status'"));
    }

    #[test]
    fn empty_fields_pass_through_as_empty_literals() {
        let script = build_connection_script(&record("", "", ""), &ScriptOptions::default());
        assert!(script.contains("var hostName = '';"));
        assert!(script.contains("var sessionToken = '';"));
        assert!(script.contains("var sessionId = '';"));
    }

    #[test]
    fn gateway_url_keeps_its_port_and_path() {
        let script = build_connection_script(
            &record("https://gw.example.com:9443/dcv", "t", "s"),
            &ScriptOptions::default(),
        );
        assert!(script.contains("var hostName = 'https://gw.example.com:9443/dcv';"));
        assert!(script.contains("hostName.indexOf('://') >= 0 ? hostName"));
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let options = ScriptOptions { sdk_url: "https://cdn.example.com/dcv.js".into(), ..ScriptOptions::default() };
        let a = build_connection_script(&record("h", "t", "s"), &options);
        let b = build_connection_script(&record("h", "t", "s"), &options);
        assert_eq!(a, b);
        assert!(a.contains("var sdkUrl = 'https://cdn.example.com/dcv.js';"));
    }
}
