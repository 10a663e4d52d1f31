use std::io::{self, Write};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::{format_display, parse_deadline_expr};
use crate::filter::Filter;
use crate::org::{Department, Role, User};
use crate::render::Renderer;
use crate::session::{Session, SessionStore};
use crate::status::{Status, classify_for_display, resolve_completion_status};
use crate::task::{NewTask, Task};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "login",
        "logout",
        "signup",
        "whoami",
        "list",
        "history",
        "info",
        "done",
        "log",
        "assign",
        "tasks",
        "delayed",
        "overview",
        "users",
        "pending",
        "approve",
        "decline",
        "move",
        "remove",
        "departments",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(api, store, cfg, renderer, inv))]
pub fn dispatch(
    api: &mut ApiClient,
    store: &SessionStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "login" => cmd_login(api, store, &inv.command_args),
        "logout" => cmd_logout(store),
        "signup" => cmd_signup(api, &inv.command_args),
        "whoami" => cmd_whoami(store),
        "list" => cmd_list(api, store, renderer, &inv.filter_terms, now),
        "history" => cmd_history(api, store, renderer, &inv.filter_terms, now),
        "info" => cmd_info(api, store, renderer, &inv.command_args, now),
        "done" => cmd_done(api, store, &inv.command_args, now),
        "log" => cmd_log(api, store, &inv.command_args),
        "assign" => cmd_assign(api, store, &inv.command_args, now),
        "tasks" => cmd_tasks(api, store, renderer, &inv.filter_terms, now),
        "delayed" => cmd_delayed(api, store, renderer, now),
        "overview" => cmd_overview(api, store, renderer, now),
        "users" => cmd_users(api, store, renderer),
        "pending" => cmd_pending(api, store, renderer),
        "approve" => cmd_approve(api, store, &inv.command_args),
        "decline" => cmd_decline(api, store, &inv.command_args),
        "move" => cmd_move(api, store, &inv.command_args),
        "remove" => cmd_remove(api, store, &inv.command_args),
        "departments" => cmd_departments(api, store, renderer),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(api, store, args))]
fn cmd_login(api: &mut ApiClient, store: &SessionStore, args: &[String]) -> anyhow::Result<()> {
    info!("command login");

    let email = args
        .first()
        .ok_or_else(|| anyhow!("login requires an email argument"))?;
    let password = read_password(args.get(1))?;

    let response = api.login(email, &password)?;
    let session = Session {
        token: response.token,
        user: response.user,
    };
    store.save(&session)?;
    api.set_token(Some(session.token.clone()));

    match session.user.role.as_deref() {
        Some(role) => println!("Logged in as {} ({role}).", session.user.name),
        None => {
            warn!("login response carried no role");
            println!("Logged in as {}.", session.user.name);
        }
    }
    Ok(())
}

#[instrument(skip(store))]
fn cmd_logout(store: &SessionStore) -> anyhow::Result<()> {
    info!("command logout");
    store.clear()?;
    println!("Logged out.");
    Ok(())
}

#[instrument(skip(api, args))]
fn cmd_signup(api: &ApiClient, args: &[String]) -> anyhow::Result<()> {
    info!("command signup");

    let (name, email) = match args {
        [name, email] => (name, email),
        _ => return Err(anyhow!("signup requires name and email arguments")),
    };
    let password = read_password(None)?;

    let message = api.signup(name, email, &password)?;
    println!(
        "{}",
        message.unwrap_or_else(
            || "Account created. An admin must approve it before you can log in.".to_string()
        )
    );
    Ok(())
}

#[instrument(skip(store))]
fn cmd_whoami(store: &SessionStore) -> anyhow::Result<()> {
    info!("command whoami");

    let session = store.require()?;
    println!(
        "{} <{}> role={}",
        session.user.name,
        session.user.email,
        session.user.role.as_deref().unwrap_or("-")
    );
    Ok(())
}

#[instrument(skip(api, store, renderer, filter_terms, now))]
fn cmd_list(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
    filter_terms: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");
    store.require()?;

    let mut tasks = api.my_tasks()?;
    tasks.retain(|task| classify_for_display(&task.status).editable);

    let filter = Filter::parse(filter_terms)?;
    let mut rows: Vec<Task> = tasks
        .into_iter()
        .filter(|task| filter.matches(task, now))
        .collect();

    if rows.is_empty() {
        println!("No open tasks assigned to you.");
        return Ok(());
    }

    rows.sort_by_key(|task| task.deadline);
    renderer.print_task_table(&rows, now)?;
    Ok(())
}

#[instrument(skip(api, store, renderer, filter_terms, now))]
fn cmd_history(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
    filter_terms: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command history");
    store.require()?;

    let mut tasks = api.my_tasks()?;
    tasks.retain(|task| {
        matches!(
            Status::from_wire(&task.status),
            Some(Status::Complete) | Some(Status::Delayed)
        )
    });

    let filter = Filter::parse(filter_terms)?;
    let mut rows: Vec<Task> = tasks
        .into_iter()
        .filter(|task| filter.matches(task, now))
        .collect();

    if rows.is_empty() {
        println!("No finished tasks yet.");
        return Ok(());
    }

    rows.sort_by(|a, b| b.deadline.cmp(&a.deadline));
    renderer.print_task_table(&rows, now)?;
    Ok(())
}

#[instrument(skip(api, store, renderer, args, now))]
fn cmd_info(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command info");
    let session = store.require()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("info requires a task id argument"))?;
    let id = resolve_task_ref(api, &session, raw)?;

    let task = api.task(id)?;
    renderer.print_task_info(&task, now)?;
    Ok(())
}

#[instrument(skip(api, store, args, now))]
fn cmd_done(
    api: &ApiClient,
    store: &SessionStore,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command done");
    let session = store.require()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("done requires a task id argument"))?;
    let id = resolve_task_ref(api, &session, raw)?;
    let task = api.task(id)?;

    if !classify_for_display(&task.status).editable {
        return Err(anyhow!(
            "task '{}' is already {}",
            task.title,
            task.status.to_ascii_uppercase()
        ));
    }

    // The target status is decided here, at the moment of submission; the
    // backend stores whatever we send.
    let target = resolve_completion_status(now, task.deadline);
    api.set_task_status(id, target)?;

    debug!(task = %id, status = target.wire_value(), "task status submitted");
    println!(
        "Task '{}' marked {}.",
        task.title,
        target.wire_value().to_ascii_uppercase()
    );
    Ok(())
}

#[instrument(skip(api, store, args))]
fn cmd_log(api: &ApiClient, store: &SessionStore, args: &[String]) -> anyhow::Result<()> {
    info!("command log");
    let session = store.require()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("log requires a task id argument"))?;
    if args.len() < 2 {
        return Err(anyhow!("log requires text argument"));
    }
    let description = args[1..].join(" ");

    let id = resolve_task_ref(api, &session, raw)?;
    let task = api.task(id)?;

    if !classify_for_display(&task.status).editable {
        return Err(anyhow!(
            "cannot add logs to a {} task",
            task.status.to_ascii_uppercase()
        ));
    }

    let log = api.append_log(id, &description)?;
    debug!(log = %log.id, "log appended");
    println!("Logged to task '{}'.", task.title);
    Ok(())
}

#[instrument(skip(api, store, args, now))]
fn cmd_assign(
    api: &ApiClient,
    store: &SessionStore,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command assign");
    store.require_admin()?;

    let mut title_words: Vec<&str> = Vec::new();
    let mut deadline_raw = None;
    let mut to_raw = None;
    let mut dept_raw = None;
    let mut note_raw = None;

    for arg in args {
        if let Some(value) = arg.strip_prefix("deadline:") {
            deadline_raw = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("to:") {
            to_raw = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("dept:") {
            dept_raw = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("note:") {
            note_raw = Some(value.to_string());
        } else {
            title_words.push(arg.as_str());
        }
    }

    let title = title_words.join(" ");
    if title.is_empty() {
        return Err(anyhow!("assign requires a task title"));
    }
    let deadline_raw = deadline_raw.ok_or_else(|| anyhow!("assign requires deadline:<expr>"))?;
    let to_raw = to_raw.ok_or_else(|| anyhow!("assign requires to:<user>"))?;
    let dept_raw = dept_raw.ok_or_else(|| anyhow!("assign requires dept:<department>"))?;
    let description = note_raw.ok_or_else(|| anyhow!("assign requires note:<description>"))?;

    let deadline = parse_deadline_expr(&deadline_raw, now)?;

    let departments = api.departments()?;
    let department = resolve_department(&departments, &dept_raw)?;
    // Ask the backend for the department's members, like the assignment
    // form's user dropdown does.
    let users = api.users(Some(&department.name))?;
    let user = resolve_user(&users, &to_raw)?;

    if user.department_id != Some(department.id) {
        return Err(anyhow!(
            "{} is not in department {}",
            user.name,
            department.name
        ));
    }

    let new_task = NewTask {
        title: title.clone(),
        description,
        deadline,
        assigned_to: user.id,
        department_id: department.id,
    };
    api.assign_task(&new_task)?;

    println!(
        "Assigned '{}' to {} (due {}).",
        title,
        user.name,
        format_display(deadline)
    );
    Ok(())
}

#[instrument(skip(api, store, renderer, filter_terms, now))]
fn cmd_tasks(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
    filter_terms: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command tasks");
    store.require_admin()?;

    let tasks = api.recent_tasks()?;

    let filter = Filter::parse(filter_terms)?;
    let mut rows: Vec<Task> = tasks
        .into_iter()
        .filter(|task| filter.matches(task, now))
        .collect();

    if rows.is_empty() {
        println!("No tasks found for the selected filters.");
        return Ok(());
    }

    rows.sort_by_key(|task| task.deadline);
    renderer.print_task_table(&rows, now)?;
    Ok(())
}

#[instrument(skip(api, store, renderer, now))]
fn cmd_delayed(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command delayed");
    store.require_admin()?;

    let tasks = api.delayed_tasks()?;
    if tasks.is_empty() {
        println!("No delayed tasks.");
        return Ok(());
    }

    renderer.print_task_table(&tasks, now)?;
    Ok(())
}

#[instrument(skip(api, store, renderer, now))]
fn cmd_overview(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command overview");
    store.require_admin()?;

    let recent = api.recent_tasks_limited()?;
    let delayed = api.delayed_tasks()?;
    let pending = api.pending_users()?;

    println!("Recent tasks:");
    if recent.is_empty() {
        println!("  none");
    } else {
        renderer.print_task_table(&recent, now)?;
    }

    println!();
    println!("Delayed tasks:");
    if delayed.is_empty() {
        println!("  none");
    } else {
        renderer.print_task_table(&delayed, now)?;
    }

    println!();
    println!("{} signup request(s) awaiting approval.", pending.len());
    Ok(())
}

#[instrument(skip(api, store, renderer))]
fn cmd_users(api: &ApiClient, store: &SessionStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command users");
    store.require_admin()?;

    let mut users = api.users(None)?;
    users.retain(|user| user.approved);

    renderer.print_user_table(&users)?;
    Ok(())
}

#[instrument(skip(api, store, renderer))]
fn cmd_pending(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    info!("command pending");
    store.require_admin()?;

    let pending = api.pending_users()?;
    if pending.is_empty() {
        println!("No pending user requests.");
        return Ok(());
    }

    renderer.print_user_table(&pending)?;
    Ok(())
}

#[instrument(skip(api, store, args))]
fn cmd_approve(api: &ApiClient, store: &SessionStore, args: &[String]) -> anyhow::Result<()> {
    info!("command approve");
    store.require_admin()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("approve requires a user argument"))?;
    let pending = api.pending_users()?;
    let user = resolve_user(&pending, raw)?;

    api.approve_user(user.id)?;
    println!("Approved {} <{}>.", user.name, user.email);
    Ok(())
}

#[instrument(skip(api, store, args))]
fn cmd_decline(api: &ApiClient, store: &SessionStore, args: &[String]) -> anyhow::Result<()> {
    info!("command decline");
    store.require_admin()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("decline requires a user argument"))?;
    let pending = api.pending_users()?;
    let user = resolve_user(&pending, raw)?;

    api.decline_user(user.id)?;
    println!("Declined {} <{}>.", user.name, user.email);
    Ok(())
}

#[instrument(skip(api, store, args))]
fn cmd_move(api: &ApiClient, store: &SessionStore, args: &[String]) -> anyhow::Result<()> {
    info!("command move");
    store.require_admin()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("move requires a user argument"))?;

    let mut dept_raw = None;
    let mut role_raw = None;
    for arg in &args[1..] {
        if let Some(value) = arg.strip_prefix("dept:") {
            dept_raw = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("role:") {
            role_raw = Some(value.to_string());
        } else {
            return Err(anyhow!("unexpected argument to move: {arg}"));
        }
    }
    let dept_raw = dept_raw.ok_or_else(|| anyhow!("move requires dept:<department>"))?;

    let users = api.users(None)?;
    let user = resolve_user(&users, raw)?;
    let departments = api.departments()?;
    let department = resolve_department(&departments, &dept_raw)?;

    let role = match role_raw {
        Some(raw_role) => raw_role.parse::<Role>()?,
        None => user
            .role
            .as_deref()
            .and_then(|r| r.parse::<Role>().ok())
            .unwrap_or(Role::Employee),
    };

    let updated = api.update_user(user.id, department.id, role)?;
    println!(
        "Moved {} to {} as {}.",
        updated.name,
        updated.department_name(),
        role.wire_value()
    );
    Ok(())
}

#[instrument(skip(api, store, args))]
fn cmd_remove(api: &ApiClient, store: &SessionStore, args: &[String]) -> anyhow::Result<()> {
    info!("command remove");
    store.require_admin()?;

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("remove requires a user argument"))?;
    let users = api.users(None)?;
    let user = resolve_user(&users, raw)?;

    api.delete_user(user.id)?;
    println!("Removed {} <{}>.", user.name, user.email);
    Ok(())
}

#[instrument(skip(api, store, renderer))]
fn cmd_departments(
    api: &ApiClient,
    store: &SessionStore,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    info!("command departments");
    store.require_admin()?;

    let departments = api.departments()?;
    renderer.print_department_table(&departments)?;
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Implemented commands: login, logout, signup, whoami, list, history, info, done, log, \
         assign, tasks, delayed, overview, users, pending, approve, decline, move, remove, \
         departments"
    );
    Ok(())
}

fn read_password(arg: Option<&String>) -> anyhow::Result<String> {
    if let Some(password) = arg {
        return Ok(password.clone());
    }

    eprint!("password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(anyhow!("password cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Resolve a task reference: a full UUID is used as-is, anything else is
/// treated as an id prefix against the tasks this session can see.
fn resolve_task_ref(api: &ApiClient, session: &Session, raw: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }

    let prefix = raw.to_ascii_lowercase();
    let mut candidates = api.my_tasks()?;
    if session.is_admin() {
        let recent = api.recent_tasks()?;
        for task in recent {
            if !candidates.iter().any(|t| t.id == task.id) {
                candidates.push(task);
            }
        }
    }

    let matches: Vec<&Task> = candidates
        .iter()
        .filter(|task| task.id.to_string().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => Err(anyhow!("no task matching id prefix: {raw}")),
        1 => Ok(matches[0].id),
        n => Err(anyhow!("task id prefix '{raw}' is ambiguous ({n} matches)")),
    }
}

fn resolve_user<'a>(users: &'a [User], raw: &str) -> anyhow::Result<&'a User> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return users
            .iter()
            .find(|user| user.id == id)
            .ok_or_else(|| anyhow!("no user with id {id}"));
    }

    if let Some(user) = users.iter().find(|user| user.email.eq_ignore_ascii_case(raw)) {
        return Ok(user);
    }

    let matches: Vec<&User> = users
        .iter()
        .filter(|user| user.name.eq_ignore_ascii_case(raw))
        .collect();

    match matches.len() {
        0 => Err(anyhow!("no user matching: {raw}")),
        1 => Ok(matches[0]),
        n => Err(anyhow!(
            "user reference '{raw}' is ambiguous ({n} matches); use the id or email"
        )),
    }
}

fn resolve_department<'a>(
    departments: &'a [Department],
    raw: &str,
) -> anyhow::Result<&'a Department> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return departments
            .iter()
            .find(|dep| dep.id == id)
            .ok_or_else(|| anyhow!("no department with id {id}"));
    }

    departments
        .iter()
        .find(|dep| dep.name.eq_ignore_ascii_case(raw))
        .ok_or_else(|| anyhow!("no department named: {raw}"))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{expand_command_abbrev, known_command_names, resolve_user};
    use crate::org::User;

    fn user(name: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role: Some("EMPLOYEE".to_string()),
            approved: true,
            department_id: None,
            department: None,
        }
    }

    #[test]
    fn abbreviations_expand_when_unambiguous() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("hist", &known), Some("history"));
        assert_eq!(expand_command_abbrev("ov", &known), Some("overview"));
        // "de" could be delayed, decline or departments.
        assert_eq!(expand_command_abbrev("de", &known), None);
    }

    #[test]
    fn user_resolution_prefers_exact_email() {
        let users = vec![user("Jane Doe", "jane@example.com"), user("Omar", "omar@example.com")];

        let found = resolve_user(&users, "jane@example.com").expect("resolve by email");
        assert_eq!(found.name, "Jane Doe");

        let found = resolve_user(&users, "omar").expect("resolve by name");
        assert_eq!(found.email, "omar@example.com");

        assert!(resolve_user(&users, "nobody").is_err());
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let users = vec![user("Jane", "jane1@example.com"), user("jane", "jane2@example.com")];
        assert!(resolve_user(&users, "jane").is_err());
        assert!(resolve_user(&users, "jane1@example.com").is_ok());
    }
}
