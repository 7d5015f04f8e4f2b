// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, parse_macro_input};

pub fn derive_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let syn::Data::Struct(data) = &input.data else {
        panic!("Layout can only be derived for structs")
    };
    let syn::Fields::Named(fields) = &data.fields else {
        panic!("Layout requires named fields")
    };
    let consts = fields.named.iter().map(|field| {
        let ident = field.ident.as_ref().unwrap();
        let ty = &field.ty;
        let upper = ident.to_string().to_uppercase();
        let offset = format_ident!("OFFSET_{upper}");
        let size = format_ident!("SIZE_{upper}");
        let end = format_ident!("END_{upper}");
        quote! {
            pub const #offset: usize = ::core::mem::offset_of!(#name, #ident);
            pub const #size: usize = ::core::mem::size_of::<#ty>();
            pub const #end: usize = Self::#offset + Self::#size;
        }
    });
    quote! {
        #[allow(dead_code)]
        impl #name {
            #(#consts)*
        }
    }
    .into()
}
