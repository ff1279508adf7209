use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(pk_auto(User::Id))
                    .col(string_len(User::Email, 255).not_null().unique_key())
                    .col(string_len(User::PasswordHash, 255).not_null())
                    .col(string_len(User::FullName, 100).not_null())
                    .col(string_len_null(User::Phone, 20))
                    .col(timestamp_with_time_zone(User::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        // Admins live apart from customers and carry a permission tier
        manager
            .create_table(
                Table::create()
                    .table(Admin::Table)
                    .if_not_exists()
                    .col(pk_auto(Admin::Id))
                    .col(string_len(Admin::Username, 50).not_null().unique_key())
                    .col(string_len(Admin::PasswordHash, 255).not_null())
                    .col(string_len(Admin::FullName, 100).not_null())
                    .col(string_len(Admin::Role, 20).not_null())
                    .col(timestamp_with_time_zone(Admin::CreatedAt).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Admin::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum User {
    Table,
    Id,
    Email,
    PasswordHash,
    FullName,
    Phone,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum Admin {
    Table,
    Id,
    Username,
    PasswordHash,
    FullName,
    Role,
    CreatedAt,
}
