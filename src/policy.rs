//! Who may do what.
//!
//! Every check takes the current user explicitly. Handlers get that user
//! from the [`crate::auth::CurrentUser`] extractor, which has already sent
//! anonymous visitors to the login page.

use crate::{
    models::{Article, ArticleDetails, User},
    Error,
};

pub trait Authored {
    fn author_id(&self) -> i64;
}

impl Authored for Article {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

impl Authored for ArticleDetails {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

/// Admins may edit anything, everyone else only what they wrote.
pub fn can_edit(user: &User, article: &impl Authored) -> bool {
    user.is_admin || user.id == article.author_id()
}

pub fn require_can_edit(user: &User, article: &impl Authored) -> Result<(), Error> {
    if can_edit(user, article) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

pub fn require_admin(user: &User) -> Result<(), Error> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::{can_edit, require_admin, require_can_edit, Authored};
    use crate::{models::User, Error};

    struct Owned(i64);

    impl Authored for Owned {
        fn author_id(&self) -> i64 {
            self.0
        }
    }

    fn user(id: i64, is_admin: bool) -> User {
        User {
            id,
            username: format!("user{id}@example.com"),
            email: format!("user{id}@example.com"),
            full_name: format!("User {id}"),
            password: String::new(),
            is_admin,
        }
    }

    #[test]
    fn test_can_edit_truth_table() {
        for user_id in 1..=3 {
            for author_id in 1..=3 {
                for is_admin in [false, true] {
                    let expected = is_admin || user_id == author_id;
                    assert_eq!(
                        can_edit(&user(user_id, is_admin), &Owned(author_id)),
                        expected,
                        "user {user_id} admin {is_admin} author {author_id}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_guards() {
        assert!(require_can_edit(&user(1, false), &Owned(1)).is_ok());
        assert!(matches!(
            require_can_edit(&user(2, false), &Owned(1)),
            Err(Error::Forbidden)
        ));
        assert!(require_admin(&user(2, true)).is_ok());
        assert!(matches!(require_admin(&user(2, false)), Err(Error::Forbidden)));
    }
}
