use rusqlite::Connection;
use taskboard_core::db::open_db_in_memory;
use taskboard_core::repo::task_repo::SqliteTaskStore;
use taskboard_core::{
    Board, BoardService, CapacityPolicy, Column, NewBoard, NewColumn, NewProject,
    NewTask, NewUser, PositionEngine, Principal, ServiceError, Task, TaskId, TaskMove,
    TaskService,
};

struct Fixture {
    conn: Connection,
    owner: Principal,
    board: Board,
}

impl Fixture {
    fn new() -> Self {
        let conn = open_db_in_memory().unwrap();
        let (owner, board) = {
            let boards = BoardService::new(&conn);
            let user = boards
                .create_user(NewUser {
                    username: "ann".to_string(),
                    email: "ann@example.com".to_string(),
                    full_name: None,
                })
                .unwrap();
            let owner = Principal::new(user.id);
            let project = boards
                .create_project(
                    &owner,
                    NewProject {
                        name: "Launch".to_string(),
                        description: None,
                    },
                )
                .unwrap();
            let board = boards
                .create_board(
                    &owner,
                    NewBoard {
                        project_id: project.id,
                        name: "Main".to_string(),
                    },
                )
                .unwrap();
            (owner, board)
        };
        Self { conn, owner, board }
    }

    fn column(&self, title: &str, wip_limit: Option<i64>) -> Column {
        BoardService::new(&self.conn)
            .create_column(
                &self.owner,
                NewColumn {
                    board_id: self.board.id,
                    title: title.to_string(),
                    position: None,
                    wip_limit,
                },
            )
            .unwrap()
    }

    fn tasks(&self, policy: CapacityPolicy) -> TaskService<'_> {
        TaskService::new(&self.conn, policy)
    }

    fn add(&self, column: &Column, title: &str) -> Task {
        self.tasks(CapacityPolicy::Advisory)
            .create_task(&self.owner, NewTask::new(column.id, title))
            .unwrap()
    }

    fn move_to(&self, task: &Task, column: &Column, position: u32) -> Task {
        self.tasks(CapacityPolicy::Advisory)
            .move_task(
                &self.owner,
                task.id,
                TaskMove {
                    column_id: column.id,
                    position,
                },
            )
            .unwrap()
    }

    fn delete(&self, task: &Task) {
        self.tasks(CapacityPolicy::Advisory)
            .delete_task(&self.owner, task.id)
            .unwrap();
    }

    /// Task ids of a column in rank order, with their ranks.
    fn ranks(&self, column: &Column) -> Vec<(TaskId, i64)> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, position FROM tasks WHERE column_id = ?1 ORDER BY position, id;")
            .unwrap();
        let rows = stmt
            .query_map([column.id.to_string()], |row| {
                let id: String = row.get(0)?;
                let id: TaskId = id.parse().unwrap();
                Ok((id, row.get::<_, i64>(1)?))
            })
            .unwrap();
        let ranks = rows.map(Result::unwrap).collect();
        ranks
    }

    fn order(&self, column: &Column) -> Vec<TaskId> {
        self.ranks(column).into_iter().map(|(id, _)| id).collect()
    }

    fn assert_dense(&self, column: &Column) {
        let ranks: Vec<i64> = self.ranks(column).into_iter().map(|(_, rank)| rank).collect();
        let expected: Vec<i64> = (0..ranks.len() as i64).collect();
        assert_eq!(ranks, expected, "column {} is not dense", column.title);
    }

    fn corrupt(&self, task: &Task, position: i64) {
        self.conn
            .execute(
                "UPDATE tasks SET position = ?2 WHERE id = ?1;",
                rusqlite::params![task.id.to_string(), position],
            )
            .unwrap();
    }
}

#[test]
fn append_to_column_of_size_n_yields_rank_n() {
    let fx = Fixture::new();
    let todo = fx.column("Todo", None);

    let first = fx.add(&todo, "first");
    let second = fx.add(&todo, "second");
    let before = fx.ranks(&todo);
    let third = fx.add(&todo, "third");

    assert_eq!(first.position, 0);
    assert_eq!(second.position, 1);
    assert_eq!(third.position, 2);
    let after = fx.ranks(&todo);
    assert_eq!(&after[..2], &before[..], "siblings must be unchanged");
    fx.assert_dense(&todo);
}

#[test]
fn same_column_move_to_tail_rotates_forward() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    let t0 = fx.add(&column, "T0");
    let t1 = fx.add(&column, "T1");
    let t2 = fx.add(&column, "T2");

    let moved = fx.move_to(&t0, &column, 2);

    assert_eq!(moved.position, 2);
    assert_eq!(fx.order(&column), vec![t1.id, t2.id, t0.id]);
    fx.assert_dense(&column);
}

#[test]
fn same_column_move_toward_head_shifts_intervening_ranks_up() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    let t0 = fx.add(&column, "T0");
    let t1 = fx.add(&column, "T1");
    let t2 = fx.add(&column, "T2");
    let t3 = fx.add(&column, "T3");

    fx.move_to(&t3, &column, 1);

    assert_eq!(fx.order(&column), vec![t0.id, t3.id, t1.id, t2.id]);
    fx.assert_dense(&column);
}

#[test]
fn cross_column_move_renumbers_both_columns() {
    let fx = Fixture::new();
    let a = fx.column("A", None);
    let b = fx.column("B", None);
    let t0 = fx.add(&a, "T0");
    let t1 = fx.add(&a, "T1");
    let t2 = fx.add(&b, "T2");

    let moved = fx.move_to(&t1, &b, 0);

    assert_eq!(moved.column_id, b.id);
    assert_eq!(moved.position, 0);
    assert_eq!(fx.order(&a), vec![t0.id]);
    assert_eq!(fx.order(&b), vec![t1.id, t2.id]);
    fx.assert_dense(&a);
    fx.assert_dense(&b);
}

#[test]
fn cross_column_move_leaves_other_columns_untouched() {
    let fx = Fixture::new();
    let a = fx.column("A", None);
    let b = fx.column("B", None);
    let c = fx.column("C", None);
    let moving = fx.add(&a, "moving");
    fx.add(&a, "stays");
    fx.add(&c, "c0");
    fx.add(&c, "c1");
    let untouched = fx.ranks(&c);

    fx.move_to(&moving, &b, 0);

    assert_eq!(fx.ranks(&c), untouched);
}

#[test]
fn move_round_trip_restores_every_rank() {
    let fx = Fixture::new();
    let a = fx.column("A", None);
    let b = fx.column("B", None);
    let a_tasks: Vec<Task> = (0..4).map(|i| fx.add(&a, &format!("a{i}"))).collect();
    for i in 0..3 {
        fx.add(&b, &format!("b{i}"));
    }
    let a_before = fx.ranks(&a);
    let b_before = fx.ranks(&b);

    let moving = &a_tasks[1];
    fx.move_to(moving, &b, 1);
    fx.move_to(moving, &a, 1);

    assert_eq!(fx.ranks(&a), a_before);
    assert_eq!(fx.ranks(&b), b_before);
}

#[test]
fn delete_shifts_every_higher_rank_down_by_one() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    let t0 = fx.add(&column, "T0");
    let t1 = fx.add(&column, "T1");
    let t2 = fx.add(&column, "T2");

    fx.delete(&t1);

    assert_eq!(fx.ranks(&column), vec![(t0.id, 0), (t2.id, 1)]);
}

#[test]
fn out_of_range_destination_ranks_are_clamped() {
    let fx = Fixture::new();
    let a = fx.column("A", None);
    let b = fx.column("B", None);
    let t0 = fx.add(&a, "T0");
    let t1 = fx.add(&a, "T1");
    let t2 = fx.add(&b, "T2");

    let same_column = fx.move_to(&t0, &a, 99);
    assert_eq!(same_column.position, 1);
    assert_eq!(fx.order(&a), vec![t1.id, t0.id]);

    let cross_column = fx.move_to(&t1, &b, 99);
    assert_eq!(cross_column.position, 1);
    assert_eq!(fx.order(&b), vec![t2.id, t1.id]);

    fx.assert_dense(&a);
    fx.assert_dense(&b);
}

#[test]
fn move_into_empty_column_lands_at_rank_zero() {
    let fx = Fixture::new();
    let a = fx.column("A", None);
    let empty = fx.column("Empty", None);
    let task = fx.add(&a, "T0");

    let moved = fx.move_to(&task, &empty, 5);

    assert_eq!(moved.position, 0);
    assert!(fx.ranks(&a).is_empty());
}

#[test]
fn moving_to_current_rank_changes_nothing() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    fx.add(&column, "T0");
    let t1 = fx.add(&column, "T1");
    let before = fx.ranks(&column);

    let moved = fx.move_to(&t1, &column, 1);

    assert_eq!(moved.position, 1);
    assert_eq!(fx.ranks(&column), before);
}

#[test]
fn density_holds_after_mixed_sequence() {
    let fx = Fixture::new();
    let columns: Vec<Column> = ["A", "B", "C"]
        .iter()
        .map(|title| fx.column(title, None))
        .collect();
    let mut tasks = Vec::new();
    for round in 0..12 {
        let column = &columns[round % columns.len()];
        tasks.push(fx.add(column, &format!("t{round}")));
    }

    for (step, task) in tasks.iter().enumerate().step_by(2) {
        let destination = &columns[(step / 2) % columns.len()];
        fx.move_to(task, destination, (step % 4) as u32);
    }
    for task in tasks.iter().skip(1).step_by(3) {
        fx.delete(task);
    }
    fx.move_to(&tasks[0], &columns[2], 0);

    for column in &columns {
        fx.assert_dense(column);
    }
}

#[test]
fn capacity_is_advisory_by_default() {
    let fx = Fixture::new();
    let limited = fx.column("Limited", Some(1));

    fx.add(&limited, "first");
    let second = fx
        .tasks(CapacityPolicy::Advisory)
        .create_task(&fx.owner, NewTask::new(limited.id, "second"));

    assert_eq!(second.unwrap().position, 1);
}

#[test]
fn capacity_is_enforced_on_append_and_cross_column_move() {
    let fx = Fixture::new();
    let limited = fx.column("Limited", Some(1));
    let other = fx.column("Other", None);
    fx.add(&limited, "first");
    let outsider = fx.add(&other, "outsider");
    let enforcing = fx.tasks(CapacityPolicy::Enforce);

    let append = enforcing.create_task(&fx.owner, NewTask::new(limited.id, "second"));
    assert!(matches!(
        append,
        Err(ServiceError::CapacityExceeded { wip_limit: 1, count: 1, .. })
    ));

    let moved = enforcing.move_task(
        &fx.owner,
        outsider.id,
        TaskMove {
            column_id: limited.id,
            position: 0,
        },
    );
    assert!(matches!(moved, Err(ServiceError::CapacityExceeded { .. })));
    assert_eq!(fx.ranks(&other), vec![(outsider.id, 0)]);
    assert_eq!(fx.ranks(&limited).len(), 1);
}

#[test]
fn capacity_does_not_block_reordering_within_a_full_column() {
    let fx = Fixture::new();
    let limited = fx.column("Limited", Some(2));
    let t0 = fx.add(&limited, "T0");
    let t1 = fx.add(&limited, "T1");

    let moved = fx
        .tasks(CapacityPolicy::Enforce)
        .move_task(
            &fx.owner,
            t1.id,
            TaskMove {
                column_id: limited.id,
                position: 0,
            },
        )
        .unwrap();

    assert_eq!(moved.position, 0);
    assert_eq!(fx.order(&limited), vec![t1.id, t0.id]);
}

#[test]
fn missing_task_or_column_is_not_found() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    let task = fx.add(&column, "T0");
    let service = fx.tasks(CapacityPolicy::Advisory);
    let missing = uuid::Uuid::new_v4();

    assert!(matches!(
        service.create_task(&fx.owner, NewTask::new(missing, "x")),
        Err(ServiceError::NotFound { .. })
    ));
    assert!(matches!(
        service.move_task(
            &fx.owner,
            task.id,
            TaskMove {
                column_id: missing,
                position: 0
            }
        ),
        Err(ServiceError::NotFound { .. })
    ));
    assert!(matches!(
        service.move_task(
            &fx.owner,
            missing,
            TaskMove {
                column_id: column.id,
                position: 0
            }
        ),
        Err(ServiceError::NotFound { .. })
    ));
    assert!(matches!(
        service.delete_task(&fx.owner, missing),
        Err(ServiceError::NotFound { .. })
    ));
    assert_eq!(fx.ranks(&column), vec![(task.id, 0)]);
}

#[test]
fn audit_reports_and_compact_repairs_drifted_columns() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    let t0 = fx.add(&column, "T0");
    let t1 = fx.add(&column, "T1");
    let t2 = fx.add(&column, "T2");
    fx.corrupt(&t0, 3);
    fx.corrupt(&t2, 7);

    let service = fx.tasks(CapacityPolicy::Advisory);
    let violations = service.audit_all().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].column_id, column.id);
    assert_eq!(violations[0].observed, vec![1, 3, 7]);

    let rewritten = service.compact_column(&fx.owner, column.id).unwrap();
    assert_eq!(rewritten, 3);
    assert_eq!(fx.order(&column), vec![t1.id, t0.id, t2.id]);
    fx.assert_dense(&column);
    assert!(service.audit_all().unwrap().is_empty());
}

#[test]
fn engine_appends_directly_through_store() {
    let fx = Fixture::new();
    let column = fx.column("C", None);
    fx.add(&column, "T0");

    let engine = PositionEngine::new(
        SqliteTaskStore::try_new(&fx.conn).unwrap(),
        CapacityPolicy::Advisory,
    );
    let mut draft = fx.add(&column, "template");
    draft.id = uuid::Uuid::new_v4();
    draft.position = 42;
    let appended = engine.append(draft).unwrap();

    assert_eq!(appended.position, 2);
    assert!(engine.audit(column.id).unwrap().is_none());
}
