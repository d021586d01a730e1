use remark_core::db::open_db_in_memory;
use remark_core::{
    Comment, CommentBody, CommentSettings, CommentThreadStore, CommentValidationError,
    IdentityStore, MemoryIdentityStore, ModerationStatus, Reply, SortMode, SqliteIdentityStore,
    ThreadError, TopLevelComment, ViewerIdentity, VoteChange, VoteCounts, VoteKey, VoteLedger,
};
use uuid::Uuid;

fn local_thread() -> CommentThreadStore<MemoryIdentityStore> {
    CommentThreadStore::new(
        Uuid::new_v4(),
        ModerationStatus::Approved,
        MemoryIdentityStore::new(),
    )
}

fn top_level_ids<I: IdentityStore>(thread: &CommentThreadStore<I>) -> Vec<i64> {
    thread.comments().iter().map(|comment| comment.body.id).collect()
}

#[test]
fn submit_comment_starts_with_zero_votes_and_no_replies() {
    let mut thread = local_thread();

    let comment = thread
        .submit_comment("Ada", "First!", Some("ada@example.org"))
        .unwrap();

    assert_eq!(comment.body.votes.like_count, 0);
    assert_eq!(comment.body.votes.dislike_count, 0);
    assert!(comment.replies.is_empty());
    assert_eq!(comment.body.status, ModerationStatus::Approved);
    assert_eq!(comment.body.author_email.as_deref(), Some("ada@example.org"));
}

#[test]
fn submission_with_empty_name_or_content_leaves_store_unchanged() {
    let mut thread = local_thread();
    thread.submit_comment("Ada", "kept", None).unwrap();

    let name_err = thread.submit_comment("", "body", None).unwrap_err();
    assert!(matches!(
        name_err,
        ThreadError::Validation(CommentValidationError::EmptyAuthorName)
    ));
    let content_err = thread.submit_comment("Ada", "", None).unwrap_err();
    assert!(matches!(
        content_err,
        ThreadError::Validation(CommentValidationError::EmptyContent)
    ));
    let email_err = thread
        .submit_comment("Ada", "body", Some("not-an-email"))
        .unwrap_err();
    assert!(matches!(
        email_err,
        ThreadError::Validation(CommentValidationError::InvalidEmail(_))
    ));

    assert_eq!(thread.total_count(), 1);
}

#[test]
fn reply_appends_to_parent_without_touching_top_level() {
    let mut thread = local_thread();
    let parent_id = thread.submit_comment("Ada", "parent", None).unwrap().body.id;
    thread.submit_comment("Bob", "sibling", None).unwrap();
    thread
        .submit_reply(parent_id, "Cy", "first reply", None)
        .unwrap();
    let before = top_level_ids(&thread);

    let reply_id = thread
        .submit_reply(parent_id, "Dee", "second reply", None)
        .unwrap()
        .body
        .id;

    assert_eq!(top_level_ids(&thread), before);
    let parent = thread
        .comments()
        .iter()
        .find(|comment| comment.body.id == parent_id)
        .unwrap();
    assert_eq!(parent.replies.len(), 2);
    assert_eq!(parent.replies.last().unwrap().body.id, reply_id);
    assert_eq!(parent.replies.last().unwrap().parent_id, parent_id);
}

#[test]
fn reply_to_unknown_or_reply_parent_is_not_found() {
    let mut thread = local_thread();
    let parent_id = thread.submit_comment("Ada", "parent", None).unwrap().body.id;
    let reply_id = thread
        .submit_reply(parent_id, "Bob", "reply", None)
        .unwrap()
        .body
        .id;

    assert!(matches!(
        thread.submit_reply(999, "Cy", "lost", None),
        Err(ThreadError::ParentNotFound(999))
    ));
    assert!(matches!(
        thread.submit_reply(reply_id, "Cy", "nested", None),
        Err(ThreadError::ParentNotFound(id)) if id == reply_id
    ));
    assert_eq!(thread.total_count(), 2);
}

#[test]
fn reply_validation_runs_before_parent_lookup() {
    let mut thread = local_thread();

    let err = thread.submit_reply(42, "Ada", " ", None).unwrap_err();
    assert!(matches!(
        err,
        ThreadError::Validation(CommentValidationError::EmptyContent)
    ));
}

#[test]
fn sorted_view_follows_current_mode() {
    let mut thread = local_thread();
    thread.set_sort_mode(SortMode::Oldest);
    let first = thread.submit_comment("Ada", "one", None).unwrap().body.id;
    let second = thread.submit_comment("Bob", "two", None).unwrap().body.id;
    let mut ledger = VoteLedger::new();
    thread
        .toggle_like(&mut ledger, VoteKey::Comment(first))
        .unwrap();

    thread.set_sort_mode(SortMode::Newest);
    let newest: Vec<i64> = thread.sorted().iter().map(|c| c.body.id).collect();
    assert_eq!(newest, vec![second, first]);

    thread.set_sort_mode(SortMode::Popular);
    let popular: Vec<i64> = thread.sorted().iter().map(|c| c.body.id).collect();
    assert_eq!(popular, vec![first, second]);
}

#[test]
fn like_then_dislike_switches_counts_atomically() {
    let mut thread = local_thread();
    let id = thread.submit_comment("Ada", "vote me", None).unwrap().body.id;
    let mut ledger = VoteLedger::new();
    let key = VoteKey::Comment(id);

    let (first, _) = thread.toggle_like(&mut ledger, key).unwrap();
    let (second, counts) = thread.toggle_like(&mut ledger, key).unwrap();
    assert_eq!(first, VoteChange::Applied);
    assert_eq!(second, VoteChange::Unchanged);
    assert_eq!(counts.like_count, 1);

    let (switch, counts) = thread.toggle_dislike(&mut ledger, key).unwrap();
    assert_eq!(switch, VoteChange::Switched);
    assert_eq!(counts.like_count, 0);
    assert_eq!(counts.dislike_count, 1);
    assert!(!(ledger.is_liked(key) && ledger.is_disliked(key)));
}

#[test]
fn voting_on_reply_never_changes_parent_counts() {
    let mut thread = local_thread();
    let parent_id = thread.submit_comment("Ada", "parent", None).unwrap().body.id;
    let reply_id = thread
        .submit_reply(parent_id, "Bob", "reply", None)
        .unwrap()
        .body
        .id;
    let mut ledger = VoteLedger::new();

    let (_, reply_counts) = thread
        .toggle_like(&mut ledger, VoteKey::Reply(reply_id))
        .unwrap();

    assert_eq!(reply_counts.like_count, 1);
    let parent = &thread.comments()[0];
    assert_eq!(parent.body.votes.like_count, 0);
    assert!(!ledger.is_liked(VoteKey::Comment(parent_id)));
}

#[test]
fn voting_on_missing_comment_fails() {
    let mut thread = local_thread();
    let mut ledger = VoteLedger::new();

    let err = thread
        .toggle_dislike(&mut ledger, VoteKey::Reply(7))
        .unwrap_err();
    assert!(matches!(err, ThreadError::CommentNotFound(VoteKey::Reply(7))));
    assert!(ledger.is_empty());
}

#[test]
fn identity_is_remembered_in_sqlite_slot_across_stores() {
    let conn = open_db_in_memory().unwrap();
    let article_id = Uuid::new_v4();

    {
        let identity = SqliteIdentityStore::try_new(&conn).unwrap();
        let mut thread =
            CommentThreadStore::new(article_id, ModerationStatus::Pending, identity);
        assert_eq!(thread.remembered_identity().unwrap(), None);
        thread
            .submit_comment(" Ada ", "hello", Some("ada@example.org"))
            .unwrap();
    }

    let identity = SqliteIdentityStore::try_new(&conn).unwrap();
    let thread = CommentThreadStore::new(article_id, ModerationStatus::Pending, identity);
    assert_eq!(
        thread.remembered_identity().unwrap(),
        Some(ViewerIdentity {
            name: "Ada".to_string(),
            email: Some("ada@example.org".to_string()),
        })
    );
}

#[test]
fn failed_submission_does_not_overwrite_identity() {
    let identity = MemoryIdentityStore::new();
    identity
        .save(&ViewerIdentity {
            name: "Ada".to_string(),
            email: None,
        })
        .unwrap();
    let mut thread = CommentThreadStore::new(Uuid::new_v4(), ModerationStatus::Approved, identity);

    thread.submit_comment("Bob", "", None).unwrap_err();

    let remembered = thread.remembered_identity().unwrap().unwrap();
    assert_eq!(remembered.name, "Ada");
}

#[test]
fn settings_control_availability_and_initial_status() {
    let disabled = CommentSettings {
        enable_comments: false,
        ..CommentSettings::default()
    };
    assert!(matches!(
        CommentThreadStore::for_settings(Uuid::new_v4(), &disabled, MemoryIdentityStore::new()),
        Err(ThreadError::CommentsDisabled)
    ));

    let mut moderated = CommentThreadStore::for_settings(
        Uuid::new_v4(),
        &CommentSettings::default(),
        MemoryIdentityStore::new(),
    )
    .unwrap();
    let status = moderated.submit_comment("Ada", "hi", None).unwrap().body.status;
    assert_eq!(status, ModerationStatus::Pending);
}

#[test]
fn removing_top_level_comment_cascades_and_clears_ledger() {
    let mut thread = local_thread();
    let parent_id = thread.submit_comment("Ada", "parent", None).unwrap().body.id;
    let reply_id = thread
        .submit_reply(parent_id, "Bob", "reply", None)
        .unwrap()
        .body
        .id;
    let mut ledger = VoteLedger::new();
    thread
        .toggle_like(&mut ledger, VoteKey::Reply(reply_id))
        .unwrap();

    let removed = thread.remove_comment(&mut ledger, parent_id).unwrap();

    assert_eq!(removed, vec![parent_id, reply_id]);
    assert_eq!(thread.total_count(), 0);
    assert!(ledger.is_empty());
}

#[test]
fn hydrated_thread_keeps_ids_increasing() {
    let mut source = local_thread();
    source.set_sort_mode(SortMode::Oldest);
    let a = source.submit_comment("Ada", "a", None).unwrap().body.id;
    source.submit_reply(a, "Bob", "r", None).unwrap();
    let tree = source.comments().to_vec();

    let mut thread = local_thread();
    thread.hydrate(tree);
    let next = thread.submit_comment("Cy", "after", None).unwrap().body.id;

    assert!(next > a + 1);
    assert_eq!(thread.comments()[0].body.id, next);
}

fn body(id: i64, article_id: Uuid) -> CommentBody {
    CommentBody {
        id,
        article_id,
        author_name: "Remote".to_string(),
        author_email: None,
        content: "from the server".to_string(),
        created_at: 1_700_000_000_000,
        status: ModerationStatus::Approved,
        votes: VoteCounts::default(),
    }
}

#[test]
fn rejected_absorb_leaves_store_untouched() {
    let mut thread = local_thread();
    let orphan = Comment::Reply(Reply {
        body: body(1000, thread.article_id()),
        parent_id: 77,
    });

    let err = thread.absorb(orphan).unwrap_err();

    assert!(matches!(err, ThreadError::ParentNotFound(77)));
    assert_eq!(thread.total_count(), 0);
    let next = thread.submit_comment("Ada", "first", None).unwrap().body.id;
    assert_eq!(next, 1);
}

#[test]
fn absorb_rejects_duplicates_and_other_articles() {
    let mut thread = local_thread();
    let existing = TopLevelComment::new(body(5, thread.article_id()));
    thread.hydrate(vec![existing.clone()]);

    let duplicate = thread.absorb(Comment::TopLevel(existing)).unwrap_err();
    assert!(matches!(duplicate, ThreadError::DuplicateComment(5)));

    let elsewhere = Uuid::new_v4();
    let foreign = thread
        .absorb(Comment::TopLevel(TopLevelComment::new(body(6, elsewhere))))
        .unwrap_err();
    assert!(matches!(
        foreign,
        ThreadError::ForeignArticle { actual, .. } if actual == elsewhere
    ));

    assert_eq!(thread.total_count(), 1);
    let next = thread.submit_comment("Ada", "local", None).unwrap().body.id;
    assert_eq!(next, 6);
}

#[test]
fn hydrate_accepts_largest_possible_id() {
    let mut thread = local_thread();
    let article_id = thread.article_id();

    thread.hydrate(vec![TopLevelComment::new(body(i64::MAX, article_id))]);

    assert_eq!(thread.comments().len(), 1);
    assert_eq!(thread.comments()[0].body.id, i64::MAX);
}
