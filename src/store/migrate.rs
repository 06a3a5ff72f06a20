use crate::engine::types::ActivityEntry;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_backfill_correct_answers", m002_backfill_correct_answers),
    ]
}

/// 执行所有未应用的迁移。
///
/// - 每个迁移必须幂等：进程可能在迁移完成后、写入版本号前中断。
/// - 每个迁移成功后立即写入版本号。
/// - 仅向前：set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuilds the per-skill correct-answer set from logged attempts, for logs
/// written before the set existed.
fn m002_backfill_correct_answers(store: &Store) -> Result<(), StoreError> {
    let mut restored = 0usize;
    for item in store.activity.iter() {
        let (_, value) = item?;
        let entry: ActivityEntry = Store::deserialize(&value)?;
        if !entry.correct {
            continue;
        }
        if let (Some(skill_id), Some(question_id)) = (&entry.skill_id, &entry.question_id) {
            store.mark_correct(&entry.user_id, &entry.subject, skill_id, question_id)?;
            restored += 1;
        }
    }
    tracing::info!(restored, "Backfilled correct answers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::engine::types::ActivityAction;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 3).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn backfill_restores_correct_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db3");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        let now = Utc::now();
        let hit = ActivityEntry::new("u1", ActivityAction::Test, "math", now)
            .with_skill("1.1")
            .with_question("q1", true, 4.0);
        let miss = ActivityEntry::new("u1", ActivityAction::Test, "math", now)
            .with_skill("1.1")
            .with_question("q2", false, 4.0);
        store.append_activity(&hit).unwrap();
        store.append_activity(&miss).unwrap();

        set_version(&store, 1).unwrap();
        run(&store).unwrap();

        let correct = store.correct_question_ids("u1", "math", "1.1").unwrap();
        assert!(correct.contains("q1"));
        assert!(!correct.contains("q2"));
    }
}
