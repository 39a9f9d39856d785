//! Property tests for the server <-> representative binding.
//!
//! Random sequences of assign / reassign / remove / verify run against a fresh
//! in-memory database. After every step the binding must be one-to-one and
//! both halves must agree; a refused operation must leave the state untouched.

use std::collections::{HashMap, HashSet};

use assembly_db::{AssignmentError, Database};
use assembly_types::models::Role;
use proptest::prelude::*;
use uuid::Uuid;

const SERVERS: usize = 4;
const REPS: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Assign { server: usize, rep: usize },
    Reassign { server: usize, rep: usize },
    Remove { server: usize },
    Verify { rep: usize, server: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let server = 0..SERVERS;
    let rep = 0..REPS;
    prop_oneof![
        (server.clone(), rep.clone()).prop_map(|(server, rep)| Op::Assign { server, rep }),
        (server.clone(), rep.clone()).prop_map(|(server, rep)| Op::Reassign { server, rep }),
        server.clone().prop_map(|server| Op::Remove { server }),
        (rep, server).prop_map(|(rep, server)| Op::Verify { rep, server }),
    ]
}

struct World {
    db: Database,
    servers: Vec<Uuid>,
    reps: Vec<Uuid>,
}

/// `verified[i]` decides whether rep i starts verified; the last server is inactive.
fn world(verified: &[bool]) -> World {
    let db = Database::open_in_memory().expect("open db");
    let servers = (0..SERVERS)
        .map(|i| {
            let id = Uuid::new_v4();
            db.create_server(id, &format!("server-{i}"), "EU", i + 1 < SERVERS)
                .expect("create server");
            id
        })
        .collect();
    let reps = verified
        .iter()
        .enumerate()
        .map(|(i, &verified)| {
            let id = Uuid::new_v4();
            db.create_profile(
                id,
                &format!("rep-{i}@example.com"),
                "Rep",
                "hash",
                Role::Representative,
                verified,
            )
            .expect("create profile");
            id
        })
        .collect();
    World { db, servers, reps }
}

/// (server -> representative, profile -> server, verified profiles)
type Snapshot = (
    HashMap<Uuid, Option<Uuid>>,
    HashMap<Uuid, Option<Uuid>>,
    HashSet<Uuid>,
);

fn snapshot(db: &Database) -> Snapshot {
    let servers = db
        .list_servers(None, None)
        .expect("list servers")
        .into_iter()
        .map(|s| (s.id, s.representative_id))
        .collect();
    let profiles = db.list_profiles(None, None).expect("list profiles");
    let verified = profiles.iter().filter(|p| p.verified).map(|p| p.id).collect();
    let bindings = profiles.into_iter().map(|p| (p.id, p.server_id)).collect();
    (servers, bindings, verified)
}

fn check_invariant(state: &Snapshot) -> Result<(), TestCaseError> {
    let (servers, profiles, verified) = state;

    let mut seen_reps = HashSet::new();
    for (server, rep) in servers {
        if let Some(rep) = rep {
            prop_assert!(seen_reps.insert(*rep), "rep {} holds two servers", rep);
            prop_assert!(verified.contains(rep), "unverified rep {} holds a server", rep);
            prop_assert_eq!(profiles.get(rep).copied().flatten(), Some(*server));
        }
    }

    let mut seen_servers = HashSet::new();
    for (rep, server) in profiles {
        if let Some(server) = server {
            prop_assert!(seen_servers.insert(*server), "server {} has two reps", server);
            prop_assert_eq!(servers.get(server).copied().flatten(), Some(*rep));
        }
    }
    Ok(())
}

fn apply(w: &World, op: &Op) -> Result<(), AssignmentError> {
    match *op {
        Op::Assign { server, rep } => w.db.assign_representative(w.servers[server], w.reps[rep]),
        Op::Reassign { server, rep } => w
            .db
            .reassign_representative(w.servers[server], w.reps[rep])
            .map(|_| ()),
        Op::Remove { server } => w.db.remove_representative(w.servers[server]).map(|_| ()),
        Op::Verify { rep, server } => w.db.verify_representative(w.reps[rep], w.servers[server]),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: the binding stays one-to-one and symmetric, and refusals are side-effect free.
    #[test]
    fn prop_binding_is_one_to_one(
        verified in proptest::collection::vec(any::<bool>(), REPS),
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let w = world(&verified);
        let mut state = snapshot(&w.db);
        check_invariant(&state)?;

        for op in &ops {
            let result = apply(&w, op);
            let next = snapshot(&w.db);
            check_invariant(&next)?;

            match result {
                Ok(()) => state = next,
                Err(AssignmentError::Database(e)) => {
                    return Err(TestCaseError::fail(format!("{:?} hit a database error: {:#}", op, e)));
                }
                Err(_) => prop_assert_eq!(&state, &next, "refused {:?} changed state", op),
            }
        }
    }

    /// Property: after removing every server's representative, nothing is bound.
    #[test]
    fn prop_remove_all_clears_everything(
        ops in proptest::collection::vec(op_strategy(), 1..30),
    ) {
        let w = world(&[true; REPS]);
        for op in &ops {
            let _ = apply(&w, op);
        }
        for &server in &w.servers {
            let _ = w.db.remove_representative(server);
        }

        let (servers, profiles, _) = snapshot(&w.db);
        prop_assert!(servers.values().all(Option::is_none));
        prop_assert!(profiles.values().all(Option::is_none));
    }
}

#[test]
fn unverified_rep_is_refused_without_mutation() {
    let w = world(&[false, true, true, true, true]);
    let before = snapshot(&w.db);

    let err = w
        .db
        .assign_representative(w.servers[0], w.reps[0])
        .unwrap_err();
    assert!(matches!(err, AssignmentError::Unverified(_)));
    assert_eq!(before, snapshot(&w.db));
}

#[test]
fn inactive_server_never_takes_a_representative() {
    let w = world(&[true; REPS]);
    let inactive = w.servers[SERVERS - 1];
    assert!(matches!(
        w.db.assign_representative(inactive, w.reps[0]),
        Err(AssignmentError::ServerInactive(_))
    ));
    assert!(matches!(
        w.db.verify_representative(w.reps[1], inactive),
        Err(AssignmentError::ServerInactive(_))
    ));
}
