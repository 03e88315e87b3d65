diesel::table! {
    tickets (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        status -> Text,
        priority -> Text,
        category_id -> Uuid,
        channel -> Text,
        requester_id -> Nullable<Uuid>,
        requester_name -> Varchar,
        requester_email -> Varchar,
        assignee_id -> Nullable<Uuid>,
        team_id -> Nullable<Uuid>,
        sla_response_deadline -> Nullable<Timestamptz>,
        sla_resolution_deadline -> Nullable<Timestamptz>,
        sla_breached -> Bool,
        satisfaction_rating -> Nullable<Int4>,
        satisfaction_comment -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ticket_categories (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Text,
        parent_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_id -> Nullable<Uuid>,
        author_name -> Nullable<Varchar>,
        author_email -> Nullable<Varchar>,
        content -> Text,
        is_internal -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_attachments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        filename -> Varchar,
        storage_path -> Varchar,
        file_size -> Int4,
        mime_type -> Varchar,
        uploaded_by_id -> Nullable<Uuid>,
        uploaded_by_name -> Nullable<Varchar>,
        uploaded_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_status_history (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        from_status -> Text,
        to_status -> Text,
        comment -> Nullable<Text>,
        changed_by_id -> Nullable<Uuid>,
        changed_by_name -> Nullable<Varchar>,
        changed_at -> Timestamptz,
    }
}

diesel::table! {
    sla_configs (id) {
        id -> Uuid,
        priority -> Text,
        response_time_minutes -> Int4,
        resolution_time_minutes -> Int4,
        description -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        name -> Varchar,
        role -> Text,
        department -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    teams (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        leader_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    team_memberships (id) {
        id -> Uuid,
        team_id -> Uuid,
        user_id -> Uuid,
        role -> Text,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    audit_logs (id) {
        id -> Uuid,
        actor_id -> Nullable<Uuid>,
        action -> Varchar,
        details -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        recipient_id -> Uuid,
        kind -> Varchar,
        title -> Varchar,
        message -> Text,
        ticket_id -> Nullable<Uuid>,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    kb_articles (id) {
        id -> Uuid,
        title -> Varchar,
        content -> Text,
        summary -> Nullable<Text>,
        category -> Varchar,
        status -> Text,
        access_level -> Text,
        is_faq -> Bool,
        created_by -> Nullable<Uuid>,
        updated_by -> Nullable<Uuid>,
        view_count -> Int4,
        helpful_count -> Int4,
        not_helpful_count -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        published_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_attachments -> tickets (ticket_id));
diesel::joinable!(ticket_status_history -> tickets (ticket_id));
diesel::joinable!(tickets -> ticket_categories (category_id));
diesel::joinable!(team_memberships -> teams (team_id));
diesel::joinable!(team_memberships -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    tickets,
    ticket_categories,
    ticket_comments,
    ticket_attachments,
    ticket_status_history,
    sla_configs,
    users,
    teams,
    team_memberships,
    audit_logs,
    notifications,
    kb_articles,
);
