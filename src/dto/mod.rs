pub mod seed_dto;
pub mod supabase_dto;
