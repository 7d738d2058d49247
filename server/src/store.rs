use async_trait::async_trait;
use mastogate::error::{Error, Result};
use mastogate::store::{AppCredentials, CredentialStore, ListMembers, ListRecord};
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT config_value FROM config WHERE config_key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => Ok(Some(row.try_get("config_value").map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn put_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO config (config_key, config_value)
            VALUES (?, ?)
            ON CONFLICT(config_key) DO UPDATE SET config_value = excluded.config_value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn delete_config(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM config WHERE config_key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn get_app_credentials(&self, instance_host: &str) -> Result<Option<AppCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT instance_host, app_id, name, website, redirect_uri,
                   client_id, client_secret, auth_uri
            FROM app_credentials
            WHERE instance_host = ?
            "#,
        )
        .bind(instance_host)
        .fetch_optional(&self.db)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(AppCredentials {
            instance_host: row.try_get("instance_host").map_err(storage_err)?,
            app_id: row.try_get("app_id").map_err(storage_err)?,
            name: row.try_get("name").map_err(storage_err)?,
            website: row.try_get("website").map_err(storage_err)?,
            redirect_uri: row.try_get("redirect_uri").map_err(storage_err)?,
            client_id: row.try_get("client_id").map_err(storage_err)?,
            client_secret: row.try_get("client_secret").map_err(storage_err)?,
            auth_uri: row.try_get("auth_uri").map_err(storage_err)?,
        }))
    }

    async fn put_app_credentials(&self, creds: &AppCredentials) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_credentials
                (instance_host, app_id, name, website, redirect_uri,
                 client_id, client_secret, auth_uri)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(instance_host) DO UPDATE SET
                app_id = excluded.app_id,
                name = excluded.name,
                website = excluded.website,
                redirect_uri = excluded.redirect_uri,
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                auth_uri = excluded.auth_uri
            "#,
        )
        .bind(&creds.instance_host)
        .bind(&creds.app_id)
        .bind(&creds.name)
        .bind(&creds.website)
        .bind(&creds.redirect_uri)
        .bind(&creds.client_id)
        .bind(&creds.client_secret)
        .bind(&creds.auth_uri)
        .execute(&self.db)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn put_list(&self, list: &ListRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lists (list_id, instance_host, title, owner_user_id, psk, public)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(list_id) DO UPDATE SET
                instance_host = excluded.instance_host,
                title = excluded.title,
                owner_user_id = excluded.owner_user_id,
                psk = excluded.psk,
                public = excluded.public
            "#,
        )
        .bind(&list.list_id)
        .bind(&list.instance_host)
        .bind(&list.title)
        .bind(&list.owner_user_id)
        .bind(&list.psk)
        .bind(list.public as i64)
        .execute(&self.db)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn put_list_members(&self, members: &ListMembers) -> Result<()> {
        let account_ids = serde_json::to_string(&members.account_ids).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO list_members (list_id, account_ids)
            VALUES (?, ?)
            ON CONFLICT(list_id) DO UPDATE SET account_ids = excluded.account_ids
            "#,
        )
        .bind(&members.list_id)
        .bind(&account_ids)
        .execute(&self.db)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}
