diesel::table! {
    podcasts (id) {
        id -> Uuid,
        title -> Varchar,
        author -> Nullable<Varchar>,
        feed_url -> Varchar,
        artwork_url -> Nullable<Varchar>,
        external_id -> Nullable<Varchar>,
        last_crawled_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    subscriptions (id) {
        id -> Uuid,
        user_id -> Uuid,
        podcast_id -> Uuid,
        #[max_length = 16]
        priority -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    episodes (id) {
        id -> Uuid,
        podcast_id -> Uuid,
        title -> Varchar,
        audio_url -> Text,
        published_at -> Nullable<Timestamptz>,
        duration_sec -> Nullable<Int4>,
        guid -> Varchar,
        #[max_length = 16]
        transcript_status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    transcripts (id) {
        id -> Uuid,
        episode_id -> Uuid,
        full_text -> Text,
        segments -> Jsonb,
        language -> Nullable<Varchar>,
        #[max_length = 16]
        status -> Varchar,
        error -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    digest_configs (id) {
        id -> Uuid,
        user_id -> Uuid,
        target_length_minutes -> Int4,
        #[max_length = 16]
        clip_length_preference -> Varchar,
        #[max_length = 16]
        structure -> Varchar,
        breadth_depth -> Int4,
        voice_id -> Varchar,
        #[max_length = 16]
        narration_depth -> Varchar,
        music_style -> Nullable<Varchar>,
        #[max_length = 16]
        transition_style -> Varchar,
        #[max_length = 16]
        delivery_day -> Varchar,
        #[max_length = 8]
        delivery_time -> Varchar,
        #[max_length = 16]
        delivery_method -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    digests (id) {
        id -> Uuid,
        user_id -> Uuid,
        config_id -> Uuid,
        title -> Varchar,
        week_start -> Timestamptz,
        week_end -> Timestamptz,
        audio_object_key -> Nullable<Text>,
        total_duration_sec -> Nullable<Float8>,
        clip_count -> Int4,
        chapters -> Nullable<Jsonb>,
        #[max_length = 16]
        status -> Varchar,
        error -> Nullable<Text>,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    digest_clips (id) {
        id -> Uuid,
        digest_id -> Uuid,
        episode_id -> Uuid,
        start_sec -> Float8,
        end_sec -> Float8,
        score -> Float8,
        score_dimensions -> Jsonb,
        position -> Int4,
        #[max_length = 8]
        feedback_tag -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(subscriptions -> podcasts (podcast_id));
diesel::joinable!(episodes -> podcasts (podcast_id));
diesel::joinable!(transcripts -> episodes (episode_id));
diesel::joinable!(digests -> digest_configs (config_id));
diesel::joinable!(digest_clips -> digests (digest_id));
diesel::joinable!(digest_clips -> episodes (episode_id));

diesel::allow_tables_to_appear_in_same_query!(
    podcasts,
    subscriptions,
    episodes,
    transcripts,
    digest_configs,
    digests,
    digest_clips,
);
