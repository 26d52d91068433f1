//! Invocation building from profiles and driver templates.
//!
//! Pure assembly: no filesystem access, nothing spawned. The argument
//! vector is passed to the subprocess API directly, with no shell
//! interpretation in between.

use crate::error::SqlPipeError;
use crate::models::command::{DriverCommand, DriverRegistry, Invocation};
use crate::models::connection::ConnectionProfile;

/// Builds ready-to-spawn invocations.
pub struct CommandBuilder;

impl CommandBuilder {
    /// Build an invocation for a named operation template.
    ///
    /// Template slots are filled positionally from `params`; names are
    /// inserted verbatim, with no escaping beyond what the template
    /// encodes. A hostile table name can therefore smuggle SQL into the
    /// query text (not into the argument vector); hardening that is the
    /// host's concern.
    pub fn build(
        profile: &ConnectionProfile,
        registry: &DriverRegistry,
        template_name: &str,
        params: &[&str],
    ) -> Result<Invocation, SqlPipeError> {
        let command = registry.get(profile.driver)?;
        let template = command.template(template_name)?;
        let sql = Self::substitute(&template.query, params);

        let mut args = template.options.clone();
        args.extend(Self::connection_args(command, profile));

        tracing::debug!(
            driver = %profile.driver,
            template = template_name,
            program = %command.program,
            "Built invocation"
        );

        Ok(Invocation {
            program: command.program.clone(),
            args,
            query_text: Self::query_text(command, &sql),
            encoding: profile.encoding,
        })
    }

    /// Build an invocation for free-form query text (execute).
    pub fn build_raw(
        profile: &ConnectionProfile,
        registry: &DriverRegistry,
        sql: &str,
    ) -> Result<Invocation, SqlPipeError> {
        let command = registry.get(profile.driver)?;

        let mut args = command.options.clone();
        args.extend(Self::connection_args(command, profile));

        tracing::debug!(driver = %profile.driver, program = %command.program, "Built invocation");

        Ok(Invocation {
            program: command.program.clone(),
            args,
            query_text: Self::query_text(command, sql),
            encoding: profile.encoding,
        })
    }

    /// Fill positional `{}` slots. When a template has more slots than
    /// params, the last param is reused (SQLite's table description uses
    /// the table name twice).
    fn substitute(template: &str, params: &[&str]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut index = 0;
        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match params.get(index).or_else(|| params.last()) {
                Some(value) => out.push_str(value),
                None => out.push_str("{}"),
            }
            index += 1;
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Expand connection-arg placeholders from the profile.
    ///
    /// An argument whose placeholder resolves to an absent value is
    /// dropped from the vector entirely (e.g. `--password={password}`
    /// with no password configured).
    fn connection_args(command: &DriverCommand, profile: &ConnectionProfile) -> Vec<String> {
        let port = profile.port;
        let fields: [(&str, Option<String>); 6] = [
            ("{host}", non_empty(&profile.host)),
            ("{port}", if port == 0 { None } else { Some(port.to_string()) }),
            ("{username}", non_empty(&profile.username)),
            ("{password}", profile.password.as_deref().and_then(non_empty)),
            ("{database}", non_empty(&profile.database)),
            ("{service}", profile.service.as_deref().and_then(non_empty)),
        ];

        let mut args = Vec::with_capacity(command.connection_args.len());
        'next_arg: for template in &command.connection_args {
            let mut arg = template.clone();
            for (placeholder, value) in &fields {
                if arg.contains(placeholder) {
                    match value {
                        Some(value) => arg = arg.replace(placeholder, value),
                        None => continue 'next_arg,
                    }
                }
            }
            args.push(arg);
        }
        args
    }

    /// Assemble the text streamed to stdin: the driver's `before`
    /// statements, then the query.
    fn query_text(command: &DriverCommand, sql: &str) -> String {
        let mut text = String::new();
        for statement in &command.before {
            text.push_str(statement);
            text.push('\n');
        }
        text.push_str(sql);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::DriverKind;

    fn postgres_profile() -> ConnectionProfile {
        let mut profile =
            ConnectionProfile::new("dev", DriverKind::Postgres, "db.local", "app", "alice");
        profile.password = Some("hunter2".to_string());
        profile
    }

    #[test]
    fn test_psql_invocation_shape() {
        let registry = DriverRegistry::builtin();
        let invocation =
            CommandBuilder::build(&postgres_profile(), &registry, "show records", &["users"])
                .unwrap();
        assert_eq!(invocation.program, "psql");
        assert_eq!(
            invocation.args,
            vec!["-h", "db.local", "-p", "5432", "-U", "alice", "app"]
        );
        assert!(invocation.query_text.contains("SELECT * FROM users LIMIT 100;"));
    }

    #[test]
    fn test_query_text_never_in_argument_vector() {
        let registry = DriverRegistry::builtin();
        let marker = "zz_marker_table_zz";
        let profiles = [
            postgres_profile(),
            {
                let mut p =
                    ConnectionProfile::new("my", DriverKind::Mysql, "db.local", "app", "root");
                p.password = Some("pw".to_string());
                p
            },
            ConnectionProfile::new("lite", DriverKind::Sqlite, "", "/tmp/app.db", ""),
            {
                let mut p =
                    ConnectionProfile::new("ms", DriverKind::Mssql, "db.local", "app", "sa");
                p.password = Some("pw".to_string());
                p
            },
        ];
        for profile in &profiles {
            let command = registry.get(profile.driver).unwrap();
            for template_name in command.templates.keys() {
                let invocation =
                    CommandBuilder::build(profile, &registry, template_name, &[marker]).unwrap();
                assert!(
                    !invocation.args.iter().any(|a| a.contains(marker)),
                    "query text leaked into args for {} / {}",
                    profile.driver,
                    template_name
                );
                assert!(invocation.query_text.contains(marker) || !command
                    .template(template_name)
                    .unwrap()
                    .query
                    .contains("{}"));
            }
        }
    }

    #[test]
    fn test_unknown_template_is_config_error() {
        let registry = DriverRegistry::builtin();
        let err = CommandBuilder::build(&postgres_profile(), &registry, "no such op", &[])
            .unwrap_err();
        assert_eq!(err.category(), "Configuration");
    }

    #[test]
    fn test_two_slot_substitution_reuses_last_param() {
        let substituted = CommandBuilder::substitute(
            "SELECT sql FROM sqlite_master WHERE name = '{}' OR tbl_name = '{}';",
            &["users"],
        );
        assert_eq!(
            substituted,
            "SELECT sql FROM sqlite_master WHERE name = 'users' OR tbl_name = 'users';"
        );
    }

    #[test]
    fn test_substitution_without_params_leaves_slot() {
        assert_eq!(CommandBuilder::substitute("EXPLAIN {}", &[]), "EXPLAIN {}");
    }

    #[test]
    fn test_absent_password_drops_argument() {
        let registry = DriverRegistry::builtin();
        let mut profile =
            ConnectionProfile::new("my", DriverKind::Mysql, "db.local", "app", "root");
        profile.password = None;
        let invocation = CommandBuilder::build_raw(&profile, &registry, "SELECT 1").unwrap();
        assert!(!invocation.args.iter().any(|a| a.starts_with("--password")));

        profile.password = Some("pw".to_string());
        let invocation = CommandBuilder::build_raw(&profile, &registry, "SELECT 1").unwrap();
        assert!(invocation.args.contains(&"--password=pw".to_string()));
    }

    #[test]
    fn test_before_statements_precede_query() {
        let registry = DriverRegistry::builtin();
        let profile = ConnectionProfile::new("lite", DriverKind::Sqlite, "", "/tmp/app.db", "");
        let invocation = CommandBuilder::build_raw(&profile, &registry, "SELECT 1;").unwrap();
        assert!(invocation.query_text.starts_with(".mode list\n"));
        assert!(invocation.query_text.ends_with("SELECT 1;\n"));
    }

    #[test]
    fn test_sqlite_connection_args_are_just_the_path() {
        let registry = DriverRegistry::builtin();
        let profile = ConnectionProfile::new("lite", DriverKind::Sqlite, "", "/tmp/app.db", "");
        let invocation = CommandBuilder::build_raw(&profile, &registry, "SELECT 1;").unwrap();
        assert_eq!(invocation.args, vec!["/tmp/app.db"]);
    }
}
