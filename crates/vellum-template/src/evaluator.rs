//! Evaluator contract and its minijinja implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use minijinja::{AutoEscape, Environment, Value};

use crate::builtins;
use crate::http::HttpClient;
use crate::scope::Scope;

/// Evaluation error.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Fragment could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(minijinja::Error),

    /// Fragment parsed but failed while running.
    #[error("evaluation failed: {0}")]
    Evaluation(minijinja::Error),
}

/// Supplies the body of a named include.
pub trait IncludeLoader: Send + Sync {
    /// Load an include, `None` when it does not exist.
    fn load(&self, name: &str) -> Option<String>;
}

impl<F> IncludeLoader for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn load(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Named includes a render may resolve.
///
/// Names outside the allow-list resolve as missing without reaching the
/// loader.
#[derive(Clone)]
pub struct Includes {
    allowed: Arc<BTreeSet<String>>,
    loader: Arc<dyn IncludeLoader>,
}

impl Includes {
    /// Create an include set.
    pub fn new(allowed: impl IntoIterator<Item = String>, loader: Arc<dyn IncludeLoader>) -> Self {
        Self {
            allowed: Arc::new(allowed.into_iter().collect()),
            loader,
        }
    }

    /// Resolve a name against the allow-list and loader.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<String> {
        if !self.allowed.contains(name) {
            tracing::warn!("include {name} is not declared, ignoring");
            return None;
        }
        self.loader.load(name)
    }
}

/// Expression and template evaluation.
///
/// Expression mode returns a single value; render mode returns text. Faults
/// are always surfaced as errors.
pub trait Evaluator: Send + Sync {
    /// Parse an expression without running it.
    fn check_expression(&self, source: &str) -> Result<(), TemplateError>;

    /// Parse a template without rendering it.
    fn check_template(&self, source: &str) -> Result<(), TemplateError>;

    /// Evaluate an expression against a scope.
    fn evaluate(&self, source: &str, scope: &Scope) -> Result<Value, TemplateError>;

    /// Render a template against a scope, resolving includes if given.
    fn render(
        &self,
        source: &str,
        scope: &Scope,
        includes: Option<&Includes>,
    ) -> Result<String, TemplateError>;
}

/// Evaluator backed by minijinja with the builtin namespaces bound.
pub struct JinjaEvaluator {
    globals: Vec<(&'static str, Value)>,
}

impl std::fmt::Debug for JinjaEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinjaEvaluator").finish_non_exhaustive()
    }
}

impl Default for JinjaEvaluator {
    fn default() -> Self {
        Self::new(HttpClient::default())
    }
}

impl JinjaEvaluator {
    /// Create an evaluator whose `http` namespace uses `client`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            globals: builtins::namespaces(client),
        }
    }

    /// Fresh environment per call, so sources need not outlive the evaluator.
    fn environment<'source>(&self) -> Environment<'source> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        for (name, value) in &self.globals {
            env.add_global(*name, value.clone());
        }
        env
    }
}

impl Evaluator for JinjaEvaluator {
    fn check_expression(&self, source: &str) -> Result<(), TemplateError> {
        let env = self.environment();
        env.compile_expression(source)
            .map(|_| ())
            .map_err(TemplateError::Syntax)
    }

    fn check_template(&self, source: &str) -> Result<(), TemplateError> {
        let env = self.environment();
        env.template_from_str(source)
            .map(|_| ())
            .map_err(TemplateError::Syntax)
    }

    fn evaluate(&self, source: &str, scope: &Scope) -> Result<Value, TemplateError> {
        let env = self.environment();
        let expression = env
            .compile_expression(source)
            .map_err(TemplateError::Syntax)?;
        expression
            .eval(scope.to_value())
            .map_err(TemplateError::Evaluation)
    }

    fn render(
        &self,
        source: &str,
        scope: &Scope,
        includes: Option<&Includes>,
    ) -> Result<String, TemplateError> {
        let mut env = self.environment();
        if let Some(includes) = includes {
            let includes = includes.clone();
            env.set_loader(move |name| Ok(includes.resolve(name)));
        }
        let template = env
            .template_from_str(source)
            .map_err(TemplateError::Syntax)?;
        template
            .render(scope.to_value())
            .map_err(TemplateError::Evaluation)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn evaluator() -> JinjaEvaluator {
        JinjaEvaluator::default()
    }

    fn scope(pairs: &[(&str, &str)]) -> Scope {
        let mut scope = Scope::new();
        scope.push_map(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<BTreeMap<_, _>>(),
        );
        scope
    }

    #[test]
    fn test_expression_returns_value() {
        let value = evaluator()
            .evaluate("name == 'vellum'", &scope(&[("name", "vellum")]))
            .unwrap();

        assert!(value.is_true());
    }

    #[test]
    fn test_render_uses_shadowed_scope() {
        let mut scope = scope(&[("who", "first")]);
        scope.push_map(BTreeMap::from([("who".to_owned(), "second")]));

        let out = evaluator().render("Hi {{ who }}", &scope, None).unwrap();

        assert_eq!(out, "Hi second");
    }

    #[test]
    fn test_render_keeps_trailing_newline() {
        let out = evaluator().render("line\n", &Scope::new(), None).unwrap();

        assert_eq!(out, "line\n");
    }

    #[test]
    fn test_render_does_not_escape_html() {
        let out = evaluator()
            .render("{{ tag }}", &scope(&[("tag", "<b>")]), None)
            .unwrap();

        assert_eq!(out, "<b>");
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        assert!(matches!(
            evaluator().check_expression("1 +"),
            Err(TemplateError::Syntax(_))
        ));
        assert!(matches!(
            evaluator().check_template("{% if %}"),
            Err(TemplateError::Syntax(_))
        ));
        assert!(evaluator().check_template("{{ a }}").is_ok());
    }

    #[test]
    fn test_evaluation_faults_surface() {
        let err = evaluator()
            .evaluate("json.decode('{broken')", &Scope::new())
            .unwrap_err();

        assert!(matches!(err, TemplateError::Evaluation(_)));
    }

    #[test]
    fn test_includes_restricted_to_allow_list() {
        let loader: Arc<dyn IncludeLoader> = Arc::new(|name: &str| match name {
            "header.html" => Some("<h1>{{ title }}</h1>".to_owned()),
            "secret.html" => Some("secret".to_owned()),
            _ => None,
        });
        let includes = Includes::new(["header.html".to_owned()], loader);
        let scope = scope(&[("title", "T")]);

        let out = evaluator()
            .render("{% include 'header.html' %}!", &scope, Some(&includes))
            .unwrap();
        assert_eq!(out, "<h1>T</h1>!");

        let err = evaluator()
            .render("{% include 'secret.html' %}", &scope, Some(&includes))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Evaluation(_)));
    }

    #[test]
    fn test_json_and_yaml_builtins() {
        let evaluator = evaluator();

        let value = evaluator
            .evaluate("json.decode('{\"a\": [1, 2]}').a[1]", &Scope::new())
            .unwrap();
        assert_eq!(value, Value::from(2));

        let text = evaluator
            .evaluate("json.encode({'k': 'v'})", &Scope::new())
            .unwrap();
        assert_eq!(text.as_str(), Some(r#"{"k":"v"}"#));

        let value = evaluator
            .evaluate("yaml.decode('a: 3').a", &Scope::new())
            .unwrap();
        assert_eq!(value, Value::from(3));

        let text = evaluator
            .evaluate("yaml.encode({'k': 'v'})", &Scope::new())
            .unwrap();
        assert_eq!(text.as_str(), Some("k: v\n"));
    }

    #[test]
    fn test_dict_builtins_join_multimaps() {
        let mut scope = Scope::new();
        scope.push_map(BTreeMap::from([(
            "headers".to_owned(),
            BTreeMap::from([("accept".to_owned(), vec!["a", "b"])]),
        )]));
        let evaluator = evaluator();

        assert_eq!(
            evaluator
                .evaluate("dict.get(headers, 'accept')", &scope)
                .unwrap()
                .as_str(),
            Some("a,b")
        );
        assert!(
            !evaluator
                .evaluate("dict.contains(headers, 'missing')", &scope)
                .unwrap()
                .is_true()
        );
    }

    #[test]
    fn test_stream_builtins_round_trip_text() {
        let value = evaluator()
            .evaluate("stream.read(stream.write('héllo'))", &Scope::new())
            .unwrap();

        assert_eq!(value.as_str(), Some("héllo"));
    }

    #[test]
    fn test_http_request_builds_call() {
        let value = evaluator()
            .evaluate(
                "http.request('post', 'http://localhost/x', {'X-A': '1'}, {'q': 1})",
                &Scope::new(),
            )
            .unwrap();

        assert_eq!(value.get_attr("method").unwrap().as_str(), Some("POST"));
        assert_eq!(
            value
                .get_attr("headers")
                .unwrap()
                .get_attr("X-A")
                .unwrap()
                .as_str(),
            Some("1")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_cmd_exec_captures_output() {
        let value = evaluator()
            .evaluate("cmd.exec('.', 'echo', 'hello')", &Scope::new())
            .unwrap();

        assert_eq!(value.get_attr("exit_code").unwrap(), Value::from(0));
        assert_eq!(
            value.get_attr("stdout").unwrap().as_str(),
            Some("hello\n")
        );
    }

    #[test]
    fn test_unknown_method_is_error() {
        assert!(evaluator().evaluate("json.nope('x')", &Scope::new()).is_err());
    }

    #[test]
    fn test_evaluator_is_send_sync() {
        static_assertions::assert_impl_all!(JinjaEvaluator: Send, Sync);
    }
}
