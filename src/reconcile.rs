//! Declared-vs-observed convergence for one device.
//!
//! Clean before add: live entries missing from the declared state are
//! removed first, then declared entries missing from the device are
//! created. Every lookup and mutation goes through the control-plane
//! session; the set difference itself is a pure function so the
//! removal laws are testable without a device.
//!
//! User clean-up works off an allow-list, not the declared set: the
//! device's own admin login and the per-device extra allowed logins
//! survive even though `add_users` would never create them.

use crate::error::AgentError;
use rosman_api::{ApiClient, Command};
use rosman_config::{generate_password, ManagedDevice, User, GENERATED_PASSWORD_LEN};
use std::collections::HashSet;
use tokio::io::{AsyncRead, AsyncWrite};

// ── Pure set difference ─────────────────────────────────────────────

/// Observed names absent from the keep set, in observed order.
pub fn names_to_remove(observed: &[String], keep: &HashSet<String>) -> Vec<String> {
    observed
        .iter()
        .filter(|name| !keep.contains(*name))
        .cloned()
        .collect()
}

// ── Observed state ──────────────────────────────────────────────────

pub async fn observed_user_logins<S>(api: &mut ApiClient<S>) -> Result<Vec<String>, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = api.run(Command::new("/user/print")).await?;
    Ok(reply.rows.iter().map(|row| row.get("name").to_string()).collect())
}

pub async fn observed_group_names<S>(api: &mut ApiClient<S>) -> Result<Vec<String>, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = api.run(Command::new("/user/group/print")).await?;
    Ok(reply.rows.iter().map(|row| row.get("name").to_string()).collect())
}

pub async fn observed_schedule_names<S>(api: &mut ApiClient<S>) -> Result<Vec<String>, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = api.run(Command::new("/system/scheduler/print")).await?;
    Ok(reply.rows.iter().map(|row| row.get("name").to_string()).collect())
}

// ── Clean ───────────────────────────────────────────────────────────

/// Remove live users whose login is not on the device's allow-list
/// (admin login + extra allowed logins + declared users).
pub async fn clean_users<S>(
    api: &mut ApiClient<S>,
    md: &ManagedDevice,
) -> Result<(), AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = &md.device.ip;
    let observed = observed_user_logins(api).await?;
    let allowed = md.allowed_logins();
    for login in names_to_remove(&observed, &allowed) {
        log::info!("[{ip}] delete user \"{login}\"");
        api.run(Command::new("/user/remove").attribute("numbers", &login))
            .await?;
    }
    Ok(())
}

/// Remove live permission groups not present in the declared set.
pub async fn clean_groups<S>(
    api: &mut ApiClient<S>,
    md: &ManagedDevice,
) -> Result<(), AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = &md.device.ip;
    let declared: HashSet<String> = md.groups.iter().map(|g| g.name.clone()).collect();
    let observed = observed_group_names(api).await?;
    for name in names_to_remove(&observed, &declared) {
        log::info!("[{ip}] delete group \"{name}\"");
        api.run(Command::new("/user/group/remove").attribute("numbers", &name))
            .await?;
    }
    Ok(())
}

/// Remove live scheduler entries not present in the declared set.
pub async fn clean_schedules<S>(
    api: &mut ApiClient<S>,
    md: &ManagedDevice,
) -> Result<(), AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = &md.device.ip;
    let declared: HashSet<String> = md.schedules.iter().map(|s| s.name.clone()).collect();
    let observed = observed_schedule_names(api).await?;
    for name in names_to_remove(&observed, &declared) {
        log::info!("[{ip}] delete schedule \"{name}\"");
        api.run(Command::new("/system/scheduler/remove").attribute("numbers", &name))
            .await?;
    }
    Ok(())
}

// ── Add ─────────────────────────────────────────────────────────────

/// Create declared groups the device does not have yet. Liveness is
/// re-queried per entry, so a group added by someone else mid-cycle is
/// skipped rather than duplicated.
pub async fn add_groups<S>(api: &mut ApiClient<S>, md: &ManagedDevice) -> Result<(), AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = &md.device.ip;
    for group in md.groups.iter() {
        if observed_group_names(api).await?.contains(&group.name) {
            log::info!("[{ip}] group \"{}\" already present", group.name);
            continue;
        }
        log::info!("[{ip}] adding group \"{}\"", group.name);
        api.run(
            Command::new("/user/group/add")
                .attribute("name", &group.name)
                .attribute("skin", &group.skin)
                .attribute("comment", &group.comment)
                .attribute("policy", &group.policy),
        )
        .await?;
    }
    Ok(())
}

/// Create declared users the device does not have yet. A user whose
/// `/user/add` is rejected is logged and skipped so the rest of the
/// set still converges. Returns the newly created users that declare a
/// public key, for the key-provisioning pass that follows.
pub async fn add_users<S>(
    api: &mut ApiClient<S>,
    md: &ManagedDevice,
) -> Result<Vec<User>, AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = &md.device.ip;
    let mut pending_keys = Vec::new();
    for user in &md.users {
        if observed_user_logins(api).await?.contains(&user.login) {
            log::info!("[{ip}] user \"{}\" already present", user.login);
            continue;
        }
        log::info!("[{ip}] adding user \"{}\"", user.login);
        let pass = if user.pass.is_empty() {
            log::info!("[{ip}] user \"{}\" has no declared password, generating one", user.login);
            generate_password(GENERATED_PASSWORD_LEN)
        } else {
            user.pass.clone()
        };
        let added = api
            .run(
                Command::new("/user/add")
                    .attribute("name", &user.login)
                    .attribute("password", &pass)
                    .attribute("group", &user.group)
                    .attribute("address", &user.address)
                    .attribute("comment", &user.comment)
                    .attribute("disabled", "no"),
            )
            .await;
        if let Err(e) = added {
            log::error!("[{ip}] adding user \"{}\" failed: {e}", user.login);
            continue;
        }
        if !user.key.is_empty() {
            pending_keys.push(user.clone());
        }
    }
    Ok(pending_keys)
}

/// Create declared scheduler entries the device does not have yet,
/// each carrying its resolved on-event script body. Comparison is by
/// name only; a live schedule with a stale body is left alone until
/// its name leaves the declared set.
pub async fn add_schedules<S>(api: &mut ApiClient<S>, md: &ManagedDevice) -> Result<(), AgentError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ip = &md.device.ip;
    for schedule in &md.schedules {
        if observed_schedule_names(api).await?.contains(&schedule.name) {
            log::info!("[{ip}] schedule \"{}\" already present", schedule.name);
            continue;
        }
        log::info!("[{ip}] adding schedule \"{}\"", schedule.name);
        api.run(
            Command::new("/system/scheduler/add")
                .attribute("name", &schedule.name)
                .attribute("disabled", &schedule.disabled)
                .attribute("start-date", &schedule.start_date)
                .attribute("start-time", &schedule.start_time)
                .attribute("interval", &schedule.interval)
                .attribute("policy", &schedule.policy)
                .attribute("comment", &schedule.comment)
                .attribute("on-event", &schedule.on_event),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosman_api::codec::{encode_sentence, read_word};
    use rosman_api::ApiConfig;
    use rosman_config::{Device, Group, Schedule, Task};
    use std::sync::Arc;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    // ── In-memory RouterOS stand-in ─────────────────────────────────

    /// Answers print/add/remove commands against in-memory sets and
    /// records every mutation it applied.
    #[derive(Default)]
    struct FakeRouter {
        users: Vec<String>,
        groups: Vec<String>,
        schedules: Vec<String>,
        mutations: Vec<String>,
        last_user_add: Option<Vec<String>>,
        reject_user_adds: bool,
    }

    fn attr(words: &[String], key: &str) -> String {
        let prefix = format!("={key}=");
        words
            .iter()
            .find_map(|w| w.strip_prefix(&prefix))
            .unwrap_or("")
            .to_string()
    }

    impl FakeRouter {
        fn print_reply(names: &[String]) -> Vec<Vec<String>> {
            let mut sentences: Vec<Vec<String>> = names
                .iter()
                .map(|n| vec!["!re".to_string(), format!("=name={n}")])
                .collect();
            sentences.push(vec!["!done".to_string()]);
            sentences
        }

        fn handle(&mut self, words: &[String]) -> Vec<Vec<String>> {
            let done = vec![vec!["!done".to_string()]];
            let trap = |msg: &str| {
                vec![
                    vec!["!trap".to_string(), format!("=message={msg}")],
                    vec!["!done".to_string()],
                ]
            };
            match words[0].as_str() {
                "/user/print" => Self::print_reply(&self.users),
                "/user/group/print" => Self::print_reply(&self.groups),
                "/system/scheduler/print" => Self::print_reply(&self.schedules),
                "/user/add" => {
                    if self.reject_user_adds {
                        return trap("user adds rejected");
                    }
                    let name = attr(words, "name");
                    self.mutations.push(format!("/user/add {name}"));
                    self.last_user_add = Some(words.to_vec());
                    self.users.push(name);
                    done
                }
                "/user/group/add" => {
                    let name = attr(words, "name");
                    self.mutations.push(format!("/user/group/add {name}"));
                    self.groups.push(name);
                    done
                }
                "/system/scheduler/add" => {
                    let name = attr(words, "name");
                    self.mutations.push(format!("/system/scheduler/add {name}"));
                    self.schedules.push(name);
                    done
                }
                "/user/remove" => {
                    let name = attr(words, "numbers");
                    match self.users.iter().position(|u| *u == name) {
                        Some(i) => {
                            self.users.remove(i);
                            self.mutations.push(format!("/user/remove {name}"));
                            done
                        }
                        None => trap("no such item"),
                    }
                }
                "/user/group/remove" => {
                    let name = attr(words, "numbers");
                    self.groups.retain(|g| *g != name);
                    self.mutations.push(format!("/user/group/remove {name}"));
                    done
                }
                "/system/scheduler/remove" => {
                    let name = attr(words, "numbers");
                    self.schedules.retain(|s| *s != name);
                    self.mutations.push(format!("/system/scheduler/remove {name}"));
                    done
                }
                other => trap(&format!("unknown command {other}")),
            }
        }
    }

    /// Serve `router` over the duplex stream until the client hangs
    /// up, then hand it back for assertions.
    fn serve(mut io: DuplexStream, mut router: FakeRouter) -> JoinHandle<FakeRouter> {
        tokio::spawn(async move {
            loop {
                let mut words = Vec::new();
                loop {
                    match read_word(&mut io).await {
                        Ok(Some(word)) => words.push(word),
                        Ok(None) => break,
                        Err(_) => return router,
                    }
                }
                if words.is_empty() {
                    continue;
                }
                for sentence in router.handle(&words) {
                    if io.write_all(&encode_sentence(&sentence)).await.is_err() {
                        return router;
                    }
                }
                if io.flush().await.is_err() {
                    return router;
                }
            }
        })
    }

    fn client(io: DuplexStream) -> ApiClient<DuplexStream> {
        ApiClient::over_stream(io, ApiConfig::new("router", 8728, "admin").password("pw"))
    }

    // ── Fixtures ────────────────────────────────────────────────────

    fn user(login: &str, key: &str) -> User {
        User {
            login: login.into(),
            pass: String::new(),
            group: "full".into(),
            address: String::new(),
            comment: "managed".into(),
            alias: "ops".into(),
            key: key.into(),
        }
    }

    fn managed(users: Vec<User>, groups: Vec<Group>, schedules: Vec<Schedule>) -> ManagedDevice {
        ManagedDevice {
            device: Device {
                name: "gw-01".into(),
                ip: "192.0.2.1".into(),
                login: "admin".into(),
                pass: "pw".into(),
                port_api: 8728,
                port_ssh: 22,
                backup_folder: "flash/backups".into(),
                task_name: "hourly".into(),
                users_aliases: vec!["ops".into()],
                schedules_aliases: vec![],
                users_allowed: vec!["monitoring".into()],
            },
            task: Arc::new(Task {
                name: "hourly".into(),
                start: 0,
                delay: 3600,
                expired: 60,
                alert: 0,
                note: String::new(),
            }),
            users,
            schedules,
            groups: Arc::new(groups),
        }
    }

    // ── Pure difference ─────────────────────────────────────────────

    #[test]
    fn names_to_remove_is_the_symmetric_left_difference() {
        let observed = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let keep: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(names_to_remove(&observed, &keep), vec!["a", "c"]);
        assert!(names_to_remove(&[], &keep).is_empty());
    }

    // ── Clean ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn clean_users_spares_the_allow_list() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve(
            server_io,
            FakeRouter {
                users: vec![
                    "admin".into(),
                    "ops-a".into(),
                    "monitoring".into(),
                    "ghost".into(),
                ],
                ..FakeRouter::default()
            },
        );

        let md = managed(vec![user("ops-a", "")], vec![], vec![]);
        let mut api = client(client_io);
        clean_users(&mut api, &md).await.unwrap();
        drop(api);

        let router = server.await.unwrap();
        // "monitoring" is allowed but not declared; only the stray
        // account goes.
        assert_eq!(router.mutations, vec!["/user/remove ghost"]);
        assert_eq!(router.users, vec!["admin", "ops-a", "monitoring"]);
    }

    #[tokio::test]
    async fn clean_groups_removes_only_undeclared() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve(
            server_io,
            FakeRouter {
                groups: vec!["full".into(), "stale".into()],
                ..FakeRouter::default()
            },
        );

        let md = managed(
            vec![],
            vec![Group {
                name: "full".into(),
                skin: String::new(),
                comment: String::new(),
                policy: "local,ssh".into(),
            }],
            vec![],
        );
        let mut api = client(client_io);
        clean_groups(&mut api, &md).await.unwrap();
        drop(api);

        let router = server.await.unwrap();
        assert_eq!(router.mutations, vec!["/user/group/remove stale"]);
        assert_eq!(router.groups, vec!["full"]);
    }

    // ── Add ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn add_users_skips_existing_and_creates_missing() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve(
            server_io,
            FakeRouter { users: vec!["admin".into(), "ops-a".into()], ..FakeRouter::default() },
        );

        let md = managed(vec![user("ops-a", ""), user("ops-b", "ops-b.pub")], vec![], vec![]);
        let mut api = client(client_io);
        let pending = add_users(&mut api, &md).await.unwrap();
        drop(api);

        let router = server.await.unwrap();
        assert_eq!(router.mutations, vec!["/user/add ops-b"]);
        // Only the newly created key-bearing user needs provisioning.
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].login, "ops-b");

        let words = router.last_user_add.unwrap();
        assert!(words.contains(&"=group=full".to_string()));
        assert!(words.contains(&"=disabled=no".to_string()));
        // Declared without a password, so one was generated.
        let pass = attr(&words, "password");
        assert_eq!(pass.len(), GENERATED_PASSWORD_LEN);
    }

    #[tokio::test]
    async fn rejected_user_add_is_skipped_not_fatal() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = serve(
            server_io,
            FakeRouter {
                users: vec!["admin".into()],
                reject_user_adds: true,
                ..FakeRouter::default()
            },
        );

        let md = managed(vec![user("ops-a", "ops-a.pub")], vec![], vec![]);
        let mut api = client(client_io);
        let pending = add_users(&mut api, &md).await.unwrap();
        drop(api);

        let router = server.await.unwrap();
        assert!(router.mutations.is_empty());
        // A user that was never created has no key to import.
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn add_schedules_carries_the_on_event_body() {
        let (client_io, server_io) = tokio::io::duplex(8192);
        let server = serve(server_io, FakeRouter::default());

        let schedule = Schedule {
            name: "nightly".into(),
            disabled: "no".into(),
            start_date: "Jan/01/2024".into(),
            start_time: "03:00:00".into(),
            interval: "1d".into(),
            policy: "read,write,policy,test".into(),
            comment: "managed".into(),
            script: "nightly.rsc".into(),
            alias: "core".into(),
            on_event: "/system backup save name=nightly".into(),
        };
        let md = managed(vec![], vec![], vec![schedule]);
        let mut api = client(client_io);
        add_schedules(&mut api, &md).await.unwrap();
        drop(api);

        let router = server.await.unwrap();
        assert_eq!(router.mutations, vec!["/system/scheduler/add nightly"]);
        assert_eq!(router.schedules, vec!["nightly"]);
    }

    #[tokio::test]
    async fn add_twice_creates_nothing_the_second_time() {
        let (client_io, server_io) = tokio::io::duplex(8192);
        let server = serve(
            server_io,
            FakeRouter { users: vec!["admin".into()], ..FakeRouter::default() },
        );

        let md = managed(
            vec![user("ops-a", "")],
            vec![Group {
                name: "full".into(),
                skin: String::new(),
                comment: String::new(),
                policy: "local,ssh".into(),
            }],
            vec![],
        );
        let mut api = client(client_io);
        add_groups(&mut api, &md).await.unwrap();
        add_users(&mut api, &md).await.unwrap();
        let first_pass = 2;

        add_groups(&mut api, &md).await.unwrap();
        add_users(&mut api, &md).await.unwrap();
        drop(api);

        let router = server.await.unwrap();
        assert_eq!(router.mutations.len(), first_pass);
    }
}
