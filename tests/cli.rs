mod support;

use predicates::str::contains;

use support::TestHome;

fn init(home: &TestHome) -> Result<String, Box<dyn std::error::Error>> {
    let data = home.json(&["init"])?;
    Ok(data["user_id"].as_str().unwrap_or_default().to_string())
}

#[test]
fn help_lists_command_groups() {
    let home = TestHome::new().unwrap();
    home.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("routine"))
        .stdout(contains("week"));

    for cmd in ["init", "auth", "task", "routine", "sync", "day", "month", "plan"] {
        home.cmd().arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn init_creates_config_identity_and_store() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    let data = home.json(&["init"])?;

    assert_eq!(data["created"]["config"], true);
    assert_eq!(data["created"]["identity"], true);
    assert_eq!(data["created"]["namespace"], true);
    let user = data["user_id"].as_str().ok_or("user id")?;
    assert!(user.starts_with("anon-"));
    assert!(home.path().join("planr.toml").exists());

    let again = home.json(&["init"])?;
    assert_eq!(again["user_id"], user);
    assert_eq!(again["created"]["identity"], false);

    home.cmd()
        .args(["auth", "whoami"])
        .assert()
        .success()
        .stdout(contains(user));
    Ok(())
}

#[test]
fn commands_without_identity_fail_as_store_unavailable() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;

    home.cmd()
        .args(["task", "ls"])
        .assert()
        .code(3)
        .stderr(contains("not signed in"));

    let output = home.cmd().args(["week", "--json"]).output()?;
    assert_eq!(output.status.code(), Some(3));
    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["command"], "week");
    assert_eq!(envelope["error"]["kind"], "store_unavailable");
    Ok(())
}

#[test]
fn routine_add_materializes_and_shows_in_week() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;

    let data = home.json(&["routine", "add", "Gym", "--days", "mon,wed"])?;
    assert_eq!(data["routine"]["title"], "Gym");
    assert_eq!(data["routine"]["frequency"], serde_json::json!([1, 3]));
    let created = data["materialized"]["created"]
        .as_array()
        .ok_or("created list")?;
    assert_eq!(created.len(), 9);

    let week = home.json(&["week"])?;
    assert_eq!(week["start"], "2024-03-04");
    let days = week["days"].as_array().ok_or("days")?;
    assert_eq!(days.len(), 7);
    assert_eq!(days[0]["due"].as_array().map(Vec::len), Some(1));
    assert_eq!(days[1]["due"].as_array().map(Vec::len), Some(0));
    assert_eq!(days[2]["due"].as_array().map(Vec::len), Some(1));

    // Viewing again does not duplicate instances.
    let listed = home.json(&["task", "ls"])?;
    assert_eq!(listed["total"], 9);

    home.cmd()
        .args(["routine", "ls"])
        .assert()
        .success()
        .stdout(contains("Gym [Mon, Wed]"));
    Ok(())
}

#[test]
fn task_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;

    let task = home.json(&["task", "add", "Write", "report", "--due", "tomorrow"])?;
    assert_eq!(task["title"], "Write report");
    assert_eq!(task["dueDate"], "2024-03-05");
    assert_eq!(task["isRoutine"], false);
    let id = task["id"].as_str().ok_or("id")?.to_string();

    let done = home.json(&["task", "done", id.as_str()])?;
    assert_eq!(done["changed"], 1);
    let done_again = home.json(&["task", "done", &id[..16]])?;
    assert_eq!(done_again["changed"], 0);

    let open = home.json(&["task", "ls"])?;
    assert_eq!(open["total"], 0);
    let all = home.json(&["task", "ls", "--all"])?;
    assert_eq!(all["total"], 1);

    let stats = home.json(&["stats"])?;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["rate"], 100);

    home.json(&["task", "rm", id.as_str()])?;
    home.cmd()
        .args(["task", "show", id.as_str()])
        .assert()
        .code(2)
        .stderr(contains("task not found"));
    Ok(())
}

#[test]
fn overdue_lists_only_open_past_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;
    home.json(&["task", "add", "Old", "--due", "2024-03-01"])?;
    home.json(&["task", "add", "Today", "--due", "today"])?;
    let done = home.json(&["task", "add", "Old done", "--due=-2"])?;
    home.json(&["task", "done", done["id"].as_str().ok_or("id")?])?;

    let overdue = home.json(&["overdue"])?;
    assert_eq!(overdue["total"], 1);
    assert_eq!(overdue["tasks"][0]["title"], "Old");
    Ok(())
}

#[test]
fn routine_rm_keeps_completed_instances() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;
    let data = home.json(&["routine", "add", "Stretch", "--days", "daily"])?;
    let routine_id = data["routine"]["id"].as_str().ok_or("id")?.to_string();
    let first = data["materialized"]["created"][0]
        .as_str()
        .ok_or("instance")?
        .to_string();
    home.json(&["task", "done", first.as_str()])?;

    let report = home.json(&["routine", "rm", routine_id.as_str()])?;
    assert_eq!(report["deleted_tasks"].as_array().map(Vec::len), Some(29));
    assert_eq!(report["preserved_tasks"], serde_json::json!([first]));

    let shown = home.json(&["task", "show", first.as_str()])?;
    assert_eq!(shown["routine_deleted"], true);
    assert_eq!(shown["isCompleted"], true);
    Ok(())
}

#[test]
fn month_view_has_42_cells() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;
    let month = home.json(&["month", "2024-02-10"])?;
    assert_eq!(month["year"], 2024);
    assert_eq!(month["month"], 2);
    let cells = month["cells"].as_array().ok_or("cells")?;
    assert_eq!(cells.len(), 42);
    assert_eq!(cells[0]["date"], "2024-01-29");
    Ok(())
}

#[test]
fn mock_plan_applies_prefixed_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;

    let preview = home.json(&["plan", "learn", "to", "play", "guitar"])?;
    assert_eq!(preview["provider"], "mock");
    assert_eq!(preview["steps"].as_array().map(Vec::len), Some(6));
    assert!(preview.get("applied").is_none());
    assert_eq!(home.json(&["task", "ls"])?["total"], 0);

    let applied = home.json(&["plan", "learn", "guitar", "--apply"])?;
    assert_eq!(applied["applied"]["task_ids"].as_array().map(Vec::len), Some(6));
    assert_eq!(applied["steps"][5]["dueDate"], "2024-03-12");

    let tasks = home.json(&["task", "ls"])?;
    assert_eq!(tasks["total"], 6);
    let titles = tasks["tasks"].as_array().ok_or("tasks")?;
    assert!(titles
        .iter()
        .all(|task| task["title"].as_str().unwrap_or_default().starts_with("[AI] ")));
    Ok(())
}

#[test]
fn gemini_without_key_is_a_provider_error() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.cmd()
        .args(["plan", "learn", "rust", "--provider", "gemini"])
        .assert()
        .code(4)
        .stderr(contains("no API key"));
    Ok(())
}

#[test]
fn user_flag_selects_namespace() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.json(&["auth", "login", "--provider", "Google", "--uid", "42"])?;
    home.json(&["task", "add", "mine"])?;

    let other = home.cmd().args(["--user", "someone-else", "task", "ls"]).output()?;
    assert_eq!(other.status.code(), Some(3));

    let whoami = home.json(&["auth", "whoami"])?;
    assert_eq!(whoami["user_id"], "google-42");
    assert_eq!(whoami["source"], "session");

    home.cmd()
        .args(["--user", "../escape", "task", "ls"])
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn logout_forgets_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;
    assert_eq!(home.json(&["auth", "logout"])?["signed_out"], true);
    home.cmd().args(["task", "ls"]).assert().code(3);
    Ok(())
}

#[test]
fn invalid_config_is_a_user_error() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    home.write_config("[planner]\nhorizon_days = 0\n")?;
    home.cmd()
        .args(["task", "ls"])
        .assert()
        .code(2)
        .stderr(contains("horizon_days"));
    Ok(())
}

#[test]
fn events_to_stdout_replace_human_output() -> Result<(), Box<dyn std::error::Error>> {
    let home = TestHome::new()?;
    init(&home)?;
    let output = home
        .cmd()
        .args(["--events", "-", "task", "add", "Ping"])
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let event: serde_json::Value = serde_json::from_str(stdout.lines().next().ok_or("event")?)?;
    assert_eq!(event["event"], "task_created");
    assert_eq!(event["data"]["title"], "Ping");
    Ok(())
}
