//! Blogging fixture model shared by unit tests.
//!
//! Blog 1─* Post (required, cascade), Author 1─* Blog (optional, set null),
//! Author 1─1 Profile (required, cascade), Post 1─* Comment (required,
//! restrict), Post *─* Tag through an implicit `PostTag` join record.

use crate::{
    config::TrackingOptions,
    error::InternalError,
    model::{
        DeleteBehavior, EntityModel, FieldKind, FieldModel, JoinEntity, KeyGeneration,
        PrincipalNavigation, RelationModel, Schema, SkipNavigationModel,
    },
    session::Session,
    traits::{EntityKind, EntityValue, Handle, Navigation},
    tracker::Tracker,
    value::{FieldValue, Value, assign},
};
use std::sync::Arc;
use ulid::Ulid;

fn unknown_field(entity: &str, field: &str) -> InternalError {
    InternalError::access(format!("'{entity}' has no field '{field}'"))
}

fn unknown_navigation(entity: &str, name: &str) -> InternalError {
    InternalError::access(format!("'{entity}' has no navigation '{name}'"))
}

// ----------------------------------------------------------------------
// Blog
// ----------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Blog {
    pub id: i64,
    pub name: String,
    pub author_id: Option<Ulid>,
    pub posts: Vec<Handle<Post>>,
    pub author: Option<Handle<Author>>,
}

impl Blog {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }
}

pub static BLOG_MODEL: EntityModel = EntityModel {
    name: "Blog",
    primary_key: &["id"],
    fields: &[
        FieldModel::new("id", FieldKind::Int),
        FieldModel::new("name", FieldKind::Text),
        FieldModel::nullable("author_id", FieldKind::Ulid),
    ],
    key_generation: KeyGeneration::Store,
};

impl EntityKind for Blog {
    const MODEL: &'static EntityModel = &BLOG_MODEL;
}

impl EntityValue for Blog {
    fn model(&self) -> &'static EntityModel {
        Self::MODEL
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.to_value()),
            "name" => Some(self.name.to_value()),
            "author_id" => Some(self.author_id.to_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => assign(&mut self.id, "Blog", field, value),
            "name" => assign(&mut self.name, "Blog", field, value),
            "author_id" => assign(&mut self.author_id, "Blog", field, value),
            _ => Err(unknown_field("Blog", field)),
        }
    }

    fn get_navigation(&self, name: &str) -> Option<Navigation> {
        match name {
            "posts" => Some(Navigation::collection(&self.posts)),
            "author" => Some(Navigation::reference(self.author)),
            _ => None,
        }
    }

    fn set_navigation(&mut self, name: &str, value: Navigation) -> Result<(), InternalError> {
        match name {
            "posts" => self.posts = value.into_collection()?,
            "author" => self.author = value.into_reference()?,
            _ => return Err(unknown_navigation("Blog", name)),
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Post
// ----------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub blog_id: i64,
    pub version: u64,
    pub blog: Option<Handle<Blog>>,
    pub tags: Vec<Handle<Tag>>,
    pub comments: Vec<Handle<Comment>>,
}

impl Post {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            ..Self::default()
        }
    }
}

pub static POST_MODEL: EntityModel = EntityModel {
    name: "Post",
    primary_key: &["id"],
    fields: &[
        FieldModel::new("id", FieldKind::Int),
        FieldModel::new("title", FieldKind::Text),
        FieldModel::new("blog_id", FieldKind::Int),
        FieldModel::token("version", FieldKind::Uint),
    ],
    key_generation: KeyGeneration::Store,
};

impl EntityKind for Post {
    const MODEL: &'static EntityModel = &POST_MODEL;
}

impl EntityValue for Post {
    fn model(&self) -> &'static EntityModel {
        Self::MODEL
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.to_value()),
            "title" => Some(self.title.to_value()),
            "blog_id" => Some(self.blog_id.to_value()),
            "version" => Some(self.version.to_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => assign(&mut self.id, "Post", field, value),
            "title" => assign(&mut self.title, "Post", field, value),
            "blog_id" => assign(&mut self.blog_id, "Post", field, value),
            "version" => assign(&mut self.version, "Post", field, value),
            _ => Err(unknown_field("Post", field)),
        }
    }

    fn get_navigation(&self, name: &str) -> Option<Navigation> {
        match name {
            "blog" => Some(Navigation::reference(self.blog)),
            "tags" => Some(Navigation::collection(&self.tags)),
            "comments" => Some(Navigation::collection(&self.comments)),
            _ => None,
        }
    }

    fn set_navigation(&mut self, name: &str, value: Navigation) -> Result<(), InternalError> {
        match name {
            "blog" => self.blog = value.into_reference()?,
            "tags" => self.tags = value.into_collection()?,
            "comments" => self.comments = value.into_collection()?,
            _ => return Err(unknown_navigation("Post", name)),
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Tag
// ----------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Tag {
    pub id: i64,
    pub label: String,
    pub posts: Vec<Handle<Post>>,
}

impl Tag {
    pub fn new(id: i64, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            ..Self::default()
        }
    }
}

pub static TAG_MODEL: EntityModel = EntityModel {
    name: "Tag",
    primary_key: &["id"],
    fields: &[
        FieldModel::new("id", FieldKind::Int),
        FieldModel::new("label", FieldKind::Text),
    ],
    key_generation: KeyGeneration::None,
};

impl EntityKind for Tag {
    const MODEL: &'static EntityModel = &TAG_MODEL;
}

impl EntityValue for Tag {
    fn model(&self) -> &'static EntityModel {
        Self::MODEL
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.to_value()),
            "label" => Some(self.label.to_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => assign(&mut self.id, "Tag", field, value),
            "label" => assign(&mut self.label, "Tag", field, value),
            _ => Err(unknown_field("Tag", field)),
        }
    }

    fn get_navigation(&self, name: &str) -> Option<Navigation> {
        (name == "posts").then(|| Navigation::collection(&self.posts))
    }

    fn set_navigation(&mut self, name: &str, value: Navigation) -> Result<(), InternalError> {
        if name != "posts" {
            return Err(unknown_navigation("Tag", name));
        }
        self.posts = value.into_collection()?;
        Ok(())
    }
}

pub static POST_TAG_MODEL: EntityModel = EntityModel {
    name: "PostTag",
    primary_key: &["post_id", "tag_id"],
    fields: &[
        FieldModel::new("post_id", FieldKind::Int),
        FieldModel::new("tag_id", FieldKind::Int),
    ],
    key_generation: KeyGeneration::None,
};

// ----------------------------------------------------------------------
// Author
// ----------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Author {
    pub id: Ulid,
    pub name: String,
    pub blogs: Vec<Handle<Blog>>,
    pub profile: Option<Handle<Profile>>,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

pub static AUTHOR_MODEL: EntityModel = EntityModel {
    name: "Author",
    primary_key: &["id"],
    fields: &[
        FieldModel::new("id", FieldKind::Ulid),
        FieldModel::new("name", FieldKind::Text),
    ],
    key_generation: KeyGeneration::Client,
};

impl EntityKind for Author {
    const MODEL: &'static EntityModel = &AUTHOR_MODEL;
}

impl EntityValue for Author {
    fn model(&self) -> &'static EntityModel {
        Self::MODEL
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.to_value()),
            "name" => Some(self.name.to_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => assign(&mut self.id, "Author", field, value),
            "name" => assign(&mut self.name, "Author", field, value),
            _ => Err(unknown_field("Author", field)),
        }
    }

    fn get_navigation(&self, name: &str) -> Option<Navigation> {
        match name {
            "blogs" => Some(Navigation::collection(&self.blogs)),
            "profile" => Some(Navigation::reference(self.profile)),
            _ => None,
        }
    }

    fn set_navigation(&mut self, name: &str, value: Navigation) -> Result<(), InternalError> {
        match name {
            "blogs" => self.blogs = value.into_collection()?,
            "profile" => self.profile = value.into_reference()?,
            _ => return Err(unknown_navigation("Author", name)),
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Profile
// ----------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Profile {
    pub id: i64,
    pub bio: String,
    pub author_id: Ulid,
    pub author: Option<Handle<Author>>,
}

impl Profile {
    pub fn new(id: i64, bio: &str) -> Self {
        Self {
            id,
            bio: bio.to_string(),
            ..Self::default()
        }
    }
}

pub static PROFILE_MODEL: EntityModel = EntityModel {
    name: "Profile",
    primary_key: &["id"],
    fields: &[
        FieldModel::new("id", FieldKind::Int),
        FieldModel::new("bio", FieldKind::Text),
        FieldModel::new("author_id", FieldKind::Ulid),
    ],
    key_generation: KeyGeneration::None,
};

impl EntityKind for Profile {
    const MODEL: &'static EntityModel = &PROFILE_MODEL;
}

impl EntityValue for Profile {
    fn model(&self) -> &'static EntityModel {
        Self::MODEL
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.to_value()),
            "bio" => Some(self.bio.to_value()),
            "author_id" => Some(self.author_id.to_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => assign(&mut self.id, "Profile", field, value),
            "bio" => assign(&mut self.bio, "Profile", field, value),
            "author_id" => assign(&mut self.author_id, "Profile", field, value),
            _ => Err(unknown_field("Profile", field)),
        }
    }

    fn get_navigation(&self, name: &str) -> Option<Navigation> {
        (name == "author").then(|| Navigation::reference(self.author))
    }

    fn set_navigation(&mut self, name: &str, value: Navigation) -> Result<(), InternalError> {
        if name != "author" {
            return Err(unknown_navigation("Profile", name));
        }
        self.author = value.into_reference()?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Comment
// ----------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub post_id: i64,
    pub post: Option<Handle<Post>>,
}

impl Comment {
    pub fn new(id: i64, body: &str) -> Self {
        Self {
            id,
            body: body.to_string(),
            ..Self::default()
        }
    }
}

pub static COMMENT_MODEL: EntityModel = EntityModel {
    name: "Comment",
    primary_key: &["id"],
    fields: &[
        FieldModel::new("id", FieldKind::Int),
        FieldModel::new("body", FieldKind::Text),
        FieldModel::new("post_id", FieldKind::Int),
    ],
    key_generation: KeyGeneration::Store,
};

impl EntityKind for Comment {
    const MODEL: &'static EntityModel = &COMMENT_MODEL;
}

impl EntityValue for Comment {
    fn model(&self) -> &'static EntityModel {
        Self::MODEL
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.to_value()),
            "body" => Some(self.body.to_value()),
            "post_id" => Some(self.post_id.to_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        match field {
            "id" => assign(&mut self.id, "Comment", field, value),
            "body" => assign(&mut self.body, "Comment", field, value),
            "post_id" => assign(&mut self.post_id, "Comment", field, value),
            _ => Err(unknown_field("Comment", field)),
        }
    }

    fn get_navigation(&self, name: &str) -> Option<Navigation> {
        (name == "post").then(|| Navigation::reference(self.post))
    }

    fn set_navigation(&mut self, name: &str, value: Navigation) -> Result<(), InternalError> {
        if name != "post" {
            return Err(unknown_navigation("Comment", name));
        }
        self.post = value.into_reference()?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Relationships
// ----------------------------------------------------------------------

pub static BLOG_POSTS: RelationModel = RelationModel {
    name: "blog_posts",
    principal: "Blog",
    dependent: "Post",
    foreign_key: &["blog_id"],
    principal_navigation: Some(PrincipalNavigation::many("posts")),
    dependent_navigation: Some("blog"),
    required: true,
    on_delete: DeleteBehavior::Cascade,
};

pub static AUTHOR_BLOGS: RelationModel = RelationModel {
    name: "author_blogs",
    principal: "Author",
    dependent: "Blog",
    foreign_key: &["author_id"],
    principal_navigation: Some(PrincipalNavigation::many("blogs")),
    dependent_navigation: Some("author"),
    required: false,
    on_delete: DeleteBehavior::SetNull,
};

pub static AUTHOR_PROFILE: RelationModel = RelationModel {
    name: "author_profile",
    principal: "Author",
    dependent: "Profile",
    foreign_key: &["author_id"],
    principal_navigation: Some(PrincipalNavigation::one("profile")),
    dependent_navigation: Some("author"),
    required: true,
    on_delete: DeleteBehavior::Cascade,
};

pub static POST_COMMENTS: RelationModel = RelationModel {
    name: "post_comments",
    principal: "Post",
    dependent: "Comment",
    foreign_key: &["post_id"],
    principal_navigation: Some(PrincipalNavigation::many("comments")),
    dependent_navigation: Some("post"),
    required: true,
    on_delete: DeleteBehavior::Restrict,
};

pub static POST_TAG_POST: RelationModel = RelationModel {
    name: "post_tag_post",
    principal: "Post",
    dependent: "PostTag",
    foreign_key: &["post_id"],
    principal_navigation: None,
    dependent_navigation: None,
    required: true,
    on_delete: DeleteBehavior::Cascade,
};

pub static POST_TAG_TAG: RelationModel = RelationModel {
    name: "post_tag_tag",
    principal: "Tag",
    dependent: "PostTag",
    foreign_key: &["tag_id"],
    principal_navigation: None,
    dependent_navigation: None,
    required: true,
    on_delete: DeleteBehavior::Cascade,
};

pub static POST_TAGS: SkipNavigationModel = SkipNavigationModel {
    name: "post_tags",
    left: "Post",
    left_navigation: "tags",
    right: "Tag",
    right_navigation: Some("posts"),
    join: JoinEntity::Implicit {
        model: &POST_TAG_MODEL,
    },
    left_relation: "post_tag_post",
    right_relation: "post_tag_tag",
};

pub fn schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .entity::<Blog>()
        .entity::<Post>()
        .entity::<Tag>()
        .entity::<Author>()
        .entity::<Profile>()
        .entity::<Comment>()
        .relation(&BLOG_POSTS)
        .relation(&AUTHOR_BLOGS)
        .relation(&AUTHOR_PROFILE)
        .relation(&POST_COMMENTS)
        .relation(&POST_TAG_POST)
        .relation(&POST_TAG_TAG)
        .skip(&POST_TAGS)
        .build()
        .expect("fixture schema is valid");

    Arc::new(schema)
}

/// Route engine logs to the test harness; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn tracker() -> Tracker {
    init_tracing();
    Tracker::new(schema(), TrackingOptions::default())
}

pub fn session() -> Session {
    init_tracing();
    Session::new(schema())
}

pub fn session_with(options: TrackingOptions) -> Session {
    init_tracing();
    Session::with_options(schema(), options)
}
