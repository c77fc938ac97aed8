//! Command parsing and execution.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use spendtrack_core::models::{
    ByCategoryParams, CategoryPayload, CategoryUpdate, ExpensePayload, ExpenseUpdate, Granularity,
    LoginRequest, SignupRequest, SummaryParams, TrendParams, TrendResponse,
};
use spendtrack_core::{ApiError, Config, Session};
use tracing::warn;

pub const USAGE: &str = "\
Usage: spendtrack <command> [args]

Commands:
  login [USERNAME|EMAIL]              Sign in (password is prompted)
  signup                              Create an account
  logout                              Remove stored tokens
  whoami                              Show the signed-in user
  categories [list]                   List categories
  categories show ID                  Show one category
  categories add NAME [COLOR]         Create a category
  categories edit ID [--name N] [--icon I] [--color C]
                                      Change a category
  categories rm ID                    Delete a category
  expenses [list]                     List expenses
  expenses show ID                    Show one expense
  expenses add DATE CATEGORY AMOUNT [DESCRIPTION...]
                                      Record an expense (DATE is YYYY-MM-DD)
  expenses edit ID [--date D] [--category C] [--amount A] [--description TEXT]
                                      Change an expense
  expenses rm ID                      Delete an expense
  reports [summary]                   Spending summary
  reports by-category [TOP_N]         Totals per category
  reports trend [day|week|month]      Spending over time
  reports dashboard                   Summary, categories and trend together

Environment:
  SPENDTRACK_API_URL       API base URL (default http://127.0.0.1:8000)
  SPENDTRACK_TOKEN_STORE   file, keyring or memory
  RUST_LOG                 Log filter, e.g. debug";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Login { identifier: Option<String> },
    Signup,
    Logout,
    Whoami,
    Categories(CategoryCommand),
    Expenses(ExpenseCommand),
    Reports(ReportCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryCommand {
    List,
    Show(i64),
    Add { name: String, color: Option<String> },
    Edit { id: i64, update: CategoryUpdate },
    Remove(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpenseCommand {
    List,
    Show(i64),
    Add(ExpenseArgs),
    Edit { id: i64, update: ExpenseUpdate },
    Remove(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseArgs {
    pub date: NaiveDate,
    pub category: i64,
    pub amount: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportCommand {
    Summary,
    ByCategory { top_n: Option<u32> },
    Trend { granularity: Option<Granularity> },
    Dashboard,
}

fn parse_id(arg: Option<&String>) -> Result<i64> {
    let arg = arg.context("Missing ID")?;
    arg.parse::<i64>()
        .with_context(|| format!("Invalid ID '{}'", arg))
}

fn parse_amount(arg: &str) -> Result<String> {
    let value: f64 = arg
        .parse()
        .with_context(|| format!("Invalid amount '{}'", arg))?;
    if !value.is_finite() {
        bail!("Invalid amount '{}'", arg);
    }
    if value < 0.0 {
        bail!("Amount cannot be negative");
    }
    Ok(arg.to_string())
}

fn parse_date(arg: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", arg))
}

/// Split `--flag value` pairs. Every flag needs a value.
fn parse_flags(args: &[String]) -> Result<Vec<(&str, &str)>> {
    let mut flags = Vec::new();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let Some(name) = flag.strip_prefix("--") else {
            bail!("Unexpected argument '{}'", flag);
        };
        let value = iter
            .next()
            .with_context(|| format!("Missing value for --{}", name))?;
        flags.push((name, value.as_str()));
    }
    Ok(flags)
}

fn parse_category_update(args: &[String]) -> Result<CategoryUpdate> {
    let mut update = CategoryUpdate::default();
    for (name, value) in parse_flags(args)? {
        match name {
            "name" => update.name = Some(value.to_string()),
            "icon" => update.icon = Some(value.to_string()),
            "color" => update.color = Some(value.to_string()),
            other => bail!("Unknown option --{}", other),
        }
    }
    if update == CategoryUpdate::default() {
        bail!("Nothing to change: pass --name, --icon or --color");
    }
    Ok(update)
}

fn parse_expense_update(args: &[String]) -> Result<ExpenseUpdate> {
    let mut update = ExpenseUpdate::default();
    for (name, value) in parse_flags(args)? {
        match name {
            "date" => update.date = Some(parse_date(value)?),
            "category" => {
                update.category = Some(
                    value
                        .parse::<i64>()
                        .with_context(|| format!("Invalid category '{}'", value))?,
                )
            }
            "amount" => update.amount = Some(parse_amount(value)?),
            "description" => update.description = Some(value.to_string()),
            other => bail!("Unknown option --{}", other),
        }
    }
    if update == ExpenseUpdate::default() {
        bail!("Nothing to change: pass --date, --category, --amount or --description");
    }
    Ok(update)
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Help);
        };
        let rest = &args[1..];
        let sub = rest.first().map(String::as_str);

        let command = match name.as_str() {
            "help" | "-h" | "--help" => Command::Help,
            "login" => Command::Login {
                identifier: rest.first().cloned(),
            },
            "signup" => Command::Signup,
            "logout" => Command::Logout,
            "whoami" => Command::Whoami,
            "categories" => Command::Categories(match sub {
                None | Some("list") => CategoryCommand::List,
                Some("show") => CategoryCommand::Show(parse_id(rest.get(1))?),
                Some("add") => CategoryCommand::Add {
                    name: rest.get(1).cloned().context("Missing category name")?,
                    color: rest.get(2).cloned(),
                },
                Some("edit") => CategoryCommand::Edit {
                    id: parse_id(rest.get(1))?,
                    update: parse_category_update(rest.get(2..).unwrap_or_default())?,
                },
                Some("rm") => CategoryCommand::Remove(parse_id(rest.get(1))?),
                Some(other) => bail!("Unknown categories command '{}'", other),
            }),
            "expenses" => Command::Expenses(match sub {
                None | Some("list") => ExpenseCommand::List,
                Some("show") => ExpenseCommand::Show(parse_id(rest.get(1))?),
                Some("add") => {
                    if rest.len() < 4 {
                        bail!("Usage: expenses add DATE CATEGORY AMOUNT [DESCRIPTION...]");
                    }
                    let date = parse_date(&rest[1])?;
                    let description = rest[4..].join(" ");
                    ExpenseCommand::Add(ExpenseArgs {
                        date,
                        category: parse_id(rest.get(2))?,
                        amount: parse_amount(&rest[3])?,
                        description: (!description.is_empty()).then_some(description),
                    })
                }
                Some("edit") => ExpenseCommand::Edit {
                    id: parse_id(rest.get(1))?,
                    update: parse_expense_update(rest.get(2..).unwrap_or_default())?,
                },
                Some("rm") => ExpenseCommand::Remove(parse_id(rest.get(1))?),
                Some(other) => bail!("Unknown expenses command '{}'", other),
            }),
            "reports" => Command::Reports(match sub {
                None | Some("summary") => ReportCommand::Summary,
                Some("by-category") => ReportCommand::ByCategory {
                    top_n: rest
                        .get(1)
                        .map(|n| n.parse::<u32>().with_context(|| format!("Invalid TOP_N '{}'", n)))
                        .transpose()?,
                },
                Some("trend") => ReportCommand::Trend {
                    granularity: rest
                        .get(1)
                        .map(|g| g.parse::<Granularity>().map_err(anyhow::Error::msg))
                        .transpose()?,
                },
                Some("dashboard") => ReportCommand::Dashboard,
                Some(other) => bail!("Unknown reports command '{}'", other),
            }),
            other => bail!("Unknown command '{}'", other),
        };
        Ok(command)
    }

    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Command::Help | Command::Login { .. } | Command::Signup | Command::Logout
        )
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub async fn run(command: Command, session: &mut Session, config: &mut Config) -> Result<()> {
    let needs_session = command.needs_session();
    if needs_session && !session.hydrate().await {
        bail!("Not logged in. Run `spendtrack login` first.");
    }

    let result = execute(command, session, config).await;
    if let (true, Err(e)) = (needs_session, &result) {
        if let Some(api_error) = e.downcast_ref::<ApiError>() {
            if session.handle_session_expired(api_error) {
                bail!("Session expired. Run `spendtrack login` to sign in again.");
            }
        }
    }
    result
}

async fn execute(command: Command, session: &mut Session, config: &mut Config) -> Result<()> {
    match command {
        Command::Help => println!("{}", USAGE),
        Command::Login { identifier } => login(session, config, identifier).await?,
        Command::Signup => signup(session).await?,
        Command::Logout => {
            session.logout()?;
            println!("Logged out.");
        }
        Command::Whoami => {
            if let Some(user) = session.current_user() {
                println!("{}", user.username);
                for (key, value) in &user.extra {
                    println!("  {}: {}", key, value);
                }
            }
        }
        Command::Categories(cmd) => categories(session, cmd).await?,
        Command::Expenses(cmd) => expenses(session, cmd).await?,
        Command::Reports(cmd) => reports(session, cmd).await?,
    }
    Ok(())
}

async fn login(session: &mut Session, config: &mut Config, identifier: Option<String>) -> Result<()> {
    let identifier = match identifier.or_else(|| config.last_username.clone()) {
        Some(id) => id,
        None => prompt("Username or email: ")?,
    };
    if identifier.is_empty() {
        bail!("Username is required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    let profile = session
        .login(&LoginRequest::from_identifier(&identifier, password))
        .await
        .context("Login failed")?;
    println!("Logged in as {}", profile.username);

    config.last_username = Some(identifier);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

async fn signup(session: &Session) -> Result<()> {
    let username = prompt("Username: ")?;
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let mut request = SignupRequest::new(username, email, password);
    request.first_name = prompt("First name: ")?;
    request.last_name = prompt("Last name: ")?;
    let income = prompt("Monthly income [0]: ")?;
    if !income.is_empty() {
        request.income_amount = parse_amount(&income)?;
    }

    session.signup(&request).await.context("Signup failed")?;
    println!("Account created. Run `spendtrack login` to sign in.");
    Ok(())
}

async fn categories(session: &Session, cmd: CategoryCommand) -> Result<()> {
    let client = session.client();
    match cmd {
        CategoryCommand::List => {
            let categories = client.list_categories().await?;
            if categories.is_empty() {
                println!("No categories.");
            }
            for c in categories {
                println!("{:>5}  {}", c.id, c.name);
            }
        }
        CategoryCommand::Show(id) => {
            let category = client.get_category(id).await?;
            println!("{}", serde_json::to_string_pretty(&category)?);
        }
        CategoryCommand::Add { name, color } => {
            let payload = CategoryPayload {
                color,
                ..CategoryPayload::named(name)
            };
            let created = client.create_category(&payload).await?;
            println!("Created category {} ({})", created.name, created.id);
        }
        CategoryCommand::Edit { id, update } => {
            let updated = client.update_category(id, &update).await?;
            println!("Updated category {} ({})", updated.name, updated.id);
        }
        CategoryCommand::Remove(id) => {
            client.delete_category(id).await?;
            println!("Deleted category {}", id);
        }
    }
    Ok(())
}

async fn expenses(session: &Session, cmd: ExpenseCommand) -> Result<()> {
    let client = session.client();
    match cmd {
        ExpenseCommand::List => {
            let expenses = client.list_expenses().await?;
            if expenses.is_empty() {
                println!("No expenses.");
            }
            for e in expenses {
                println!(
                    "{:>5}  {}  {:>10}  {:<16}  {}",
                    e.id,
                    e.date,
                    e.amount,
                    e.category_label(),
                    e.description
                );
            }
        }
        ExpenseCommand::Show(id) => {
            let expense = client.get_expense(id).await?;
            println!("{}", serde_json::to_string_pretty(&expense)?);
        }
        ExpenseCommand::Add(args) => {
            let payload = ExpensePayload {
                date: args.date,
                category: args.category,
                amount: args.amount,
                description: args.description,
            };
            let created = client.create_expense(&payload).await?;
            println!("Recorded expense {} of {}", created.id, created.amount);
        }
        ExpenseCommand::Edit { id, update } => {
            let updated = client.update_expense(id, &update).await?;
            println!(
                "Updated expense {}: {}  {}  {}",
                updated.id,
                updated.date,
                updated.amount,
                updated.category_label()
            );
        }
        ExpenseCommand::Remove(id) => {
            client.delete_expense(id).await?;
            println!("Deleted expense {}", id);
        }
    }
    Ok(())
}

fn print_trend(trend: &TrendResponse) {
    println!("Trend by {}:", trend.filters.granularity);
    for point in &trend.series {
        println!("  {:<12} {:>10.2}", point.period, point.total);
    }
    println!("  {:<12} {:>10.2}", "total", trend.total());
}

async fn reports(session: &Session, cmd: ReportCommand) -> Result<()> {
    let client = session.client();
    match cmd {
        ReportCommand::Summary => {
            let summary = client.report_summary(&SummaryParams::default()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ReportCommand::ByCategory { top_n } => {
            let params = ByCategoryParams {
                top_n,
                ..Default::default()
            };
            let breakdown = client.report_by_category(&params).await?;
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
        }
        ReportCommand::Trend { granularity } => {
            let trend = client
                .report_trend(&TrendParams {
                    granularity,
                    ..Default::default()
                })
                .await?;
            print_trend(&trend);
        }
        ReportCommand::Dashboard => {
            let dashboard = client
                .dashboard(
                    &SummaryParams::default(),
                    &ByCategoryParams::default(),
                    &TrendParams::default(),
                )
                .await?;
            println!("Summary:\n{}", serde_json::to_string_pretty(&dashboard.summary)?);
            println!("By category:\n{}", serde_json::to_string_pretty(&dashboard.by_category)?);
            print_trend(&dashboard.trend);
        }
    }
    Ok(())
}
