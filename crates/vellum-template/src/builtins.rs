//! Builtin namespaces available to every expression and template.
//!
//! | name     | methods                                        |
//! |----------|------------------------------------------------|
//! | `cmd`    | `exec(workdir, command, args?, shell?)`, `debug(message)` |
//! | `dict`   | `contains(map, key)`, `get(map, key)`          |
//! | `http`   | `request(method, url, headers?, body?)`, `send(call)` |
//! | `json`   | `decode(text)`, `encode(value)`                |
//! | `stream` | `read(bytes)`, `write(text)`                   |
//! | `yaml`   | `decode(text)`, `encode(value)`                |

use std::process::Command;
use std::sync::Arc;

use minijinja::value::{Object, ObjectRepr, Value, ValueKind, from_args};
use minijinja::{Error, ErrorKind, State};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::http::{HttpClient, OutboundCall};

/// Bind every namespace as a global value.
pub(crate) fn namespaces(client: HttpClient) -> Vec<(&'static str, Value)> {
    vec![
        ("cmd", Value::from_object(Cmd)),
        ("dict", Value::from_object(Dict)),
        ("http", http_value(client)),
        ("json", Value::from_object(Json)),
        ("stream", Value::from_object(Stream)),
        ("yaml", Value::from_object(Yaml)),
    ]
}

/// The `http` namespace as a value, also bound as `client` by the proxy engine.
#[must_use]
pub fn http_value(client: HttpClient) -> Value {
    Value::from_object(Http { client })
}

fn unknown_method(namespace: &str, method: &str) -> Error {
    Error::new(
        ErrorKind::UnknownMethod,
        format!("{namespace} has no method named {method}"),
    )
}

fn invalid(detail: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, detail.to_string())
}

/// Convert a template value into a typed struct through JSON.
fn deserialize<T: DeserializeOwned>(value: &Value) -> Result<T, Error> {
    let json = serde_json::to_value(value).map_err(invalid)?;
    serde_json::from_value(json).map_err(invalid)
}

#[derive(Debug, Serialize)]
struct CommandOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

#[derive(Debug)]
struct Cmd;

impl Cmd {
    fn exec(workdir: &str, command: &str, args: Option<&str>, shell: bool) -> Result<Value, Error> {
        let args = args.unwrap_or_default();
        let mut process = if shell {
            let mut sh = Command::new("sh");
            sh.arg("-c").arg(format!("{command} {args}"));
            sh
        } else {
            let mut direct = Command::new(command);
            direct.args(args.split_whitespace());
            direct
        };
        let output = process
            .current_dir(workdir)
            .output()
            .map_err(|e| invalid(format!("failed to run {command}: {e}")))?;
        Ok(Value::from_serialize(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }))
    }
}

impl Object for Cmd {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "exec" => {
                let (workdir, command, arguments, shell): (String, String, Option<String>, Option<bool>) =
                    from_args(args)?;
                Self::exec(&workdir, &command, arguments.as_deref(), shell.unwrap_or(false))
            }
            "debug" => {
                let (message,): (String,) = from_args(args)?;
                tracing::debug!("{message}");
                Ok(Value::from(()))
            }
            _ => Err(unknown_method("cmd", method)),
        }
    }
}

#[derive(Debug)]
struct Dict;

impl Object for Dict {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let (map, key): (Value, String) = from_args(args)?;
        let item = map.get_item(&Value::from(key))?;
        match method {
            "contains" => Ok(Value::from(!item.is_undefined())),
            "get" if item.kind() == ValueKind::Seq => {
                let joined = item
                    .try_iter()?
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(Value::from(joined))
            }
            "get" if item.is_undefined() => Ok(Value::from("")),
            "get" => Ok(item),
            _ => Err(unknown_method("dict", method)),
        }
    }
}

#[derive(Debug)]
struct Http {
    client: HttpClient,
}

impl Object for Http {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "request" => {
                let (method, url, headers, body): (String, String, Option<Value>, Option<Value>) =
                    from_args(args)?;
                let mut call = OutboundCall::new(&method, &url);
                if let Some(headers) = headers {
                    call.headers = deserialize(&headers)?;
                }
                if let Some(body) = body {
                    call.body = Some(serde_json::to_value(&body).map_err(invalid)?);
                }
                Ok(Value::from_serialize(call))
            }
            "send" => {
                let (call,): (Value,) = from_args(args)?;
                let call: OutboundCall = deserialize(&call)?;
                let response = self.client.send(&call).map_err(invalid)?;
                Ok(Value::from_serialize(response))
            }
            _ => Err(unknown_method("http", method)),
        }
    }
}

#[derive(Debug)]
struct Json;

impl Object for Json {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "decode" => {
                let (text,): (String,) = from_args(args)?;
                let parsed: serde_json::Value = serde_json::from_str(&text).map_err(invalid)?;
                Ok(Value::from_serialize(parsed))
            }
            "encode" => {
                let (value,): (Value,) = from_args(args)?;
                Ok(Value::from(serde_json::to_string(&value).map_err(invalid)?))
            }
            _ => Err(unknown_method("json", method)),
        }
    }
}

#[derive(Debug)]
struct Yaml;

impl Object for Yaml {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "decode" => {
                let (text,): (String,) = from_args(args)?;
                let parsed: serde_yaml::Value = serde_yaml::from_str(&text).map_err(invalid)?;
                Ok(Value::from_serialize(parsed))
            }
            "encode" => {
                let (value,): (Value,) = from_args(args)?;
                Ok(Value::from(serde_yaml::to_string(&value).map_err(invalid)?))
            }
            _ => Err(unknown_method("yaml", method)),
        }
    }
}

#[derive(Debug)]
struct Stream;

impl Object for Stream {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "read" => {
                let (value,): (Value,) = from_args(args)?;
                Ok(match value.as_bytes() {
                    Some(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
                    None => Value::from(value.to_string()),
                })
            }
            "write" => {
                let (text,): (String,) = from_args(args)?;
                Ok(Value::from_bytes(text.into_bytes()))
            }
            _ => Err(unknown_method("stream", method)),
        }
    }
}
